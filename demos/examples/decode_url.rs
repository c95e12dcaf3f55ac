use std::error::Error;
use std::time::Duration;

use jopus::{decode_url, HttpSettings};
use jopus_demos::{init_tracing, log_summary};

/// Usage: decode_url <url> [proxy_host proxy_port] [--insecure]
#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    init_tracing()?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let insecure = args.iter().any(|a| a == "--insecure");
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();

    let url = positional
        .first()
        .ok_or("usage: decode_url <url> [proxy_host proxy_port] [--insecure]")?;

    let mut settings = HttpSettings::new()
        .with_skip_certificate_check(insecure)
        .with_timeout(Duration::from_secs(60));
    if let (Some(host), Some(port)) = (positional.get(1), positional.get(2)) {
        settings = settings.with_proxy(host.as_str(), port.parse()?);
    }

    let audio = decode_url(url, &settings).await?;
    log_summary(url, &audio);

    Ok(())
}
