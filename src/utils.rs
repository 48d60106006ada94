// (C) Coralbits SL 2025
// This file is part of Cachelink and is licensed under the
// GNU Affero General Public License v3.0.
// A commercial license on request is also available;
// contact info@coralbits.com for details.

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

pub fn setup_logging(debug: bool) -> anyhow::Result<()> {
    let log_level = if debug { Level::DEBUG } else { Level::INFO };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        // stdout is reserved for command output
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Setting default subscriber failed: {}", e))?;
    Ok(())
}
