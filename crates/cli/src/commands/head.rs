use std::path::Path;

use crate::engine;

pub async fn run(dir: &Path, brook_type: &str, id: &str) -> anyhow::Result<()> {
    let engine = engine::open(dir)?;
    let key = engine::key(brook_type, id)?;

    let head = engine.get_head(&key).await?;
    if head.is_set() {
        println!("{} head: {}", key, head);
    } else {
        println!("{} is empty", key);
    }
    Ok(())
}
