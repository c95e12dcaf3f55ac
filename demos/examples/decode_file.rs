use std::error::Error;

use jopus::decode_file;
use jopus_demos::{init_tracing, log_summary};

fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    init_tracing()?;

    let path = std::env::args()
        .nth(1)
        .ok_or("usage: decode_file <path.opus>")?;

    let audio = decode_file(&path)?;
    log_summary(&path, &audio);

    Ok(())
}
