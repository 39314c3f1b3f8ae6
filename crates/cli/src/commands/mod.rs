pub mod append;
pub mod head;
pub mod inspect;
pub mod read;
pub mod verify;
