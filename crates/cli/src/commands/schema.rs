use anyhow::Result;
use autopush_core::configs::push::push_config_schema;

pub fn execute() -> Result<()> {
    let schema = push_config_schema().map_err(|e| anyhow::anyhow!("{}", e))?;
    println!("{}", schema);
    Ok(())
}
