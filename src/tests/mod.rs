pub mod position_tests;
pub mod fingerprint_tests;
