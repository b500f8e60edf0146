use clap::Parser;
use log::{error, info};
use p1mqtt::{bridge::shutdown_on, mqtt::RetryPolicy, p1, Bridge, Config, MqttPublisher, Pipeline};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "p1mqtt", version, about = "Publish DSMR P1 smart meter telegrams to MQTT")]
struct Args {
    /// Configuration file, defaults to config/p1mqtt.yaml or p1mqtt.yaml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Read telegrams from this file instead of the serial device
    #[arg(long)]
    testfile: Option<PathBuf>,

    /// With --testfile, release at most one telegram every n seconds
    #[arg(long, default_value_t = 0)]
    ratelimit: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    let default_filter = std::env::var("P1MQTT_LOG_LEVEL").unwrap_or("info".to_string());
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    let args = Args::parse();
    info!("p1mqtt {}", env!("CARGO_PKG_VERSION"));

    match run(args).await {
        Ok(()) => {
            info!("Done. Exiting.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let path = Config::locate(args.config)?;
    let config = Config::load(&path)?;

    let rate_limit = (args.ratelimit > 0).then(|| Duration::from_secs(args.ratelimit));
    let source = p1::open_source(&config.p1, args.testfile.as_deref(), rate_limit)?;

    let retry = RetryPolicy::from_config(&config.mqtt);
    let publisher = MqttPublisher::connect(&config.mqtt);
    let pipeline = Pipeline::new(config)?;

    let (telegrams, _reader) = p1::spawn_reader(source);
    let mut bridge = Bridge::new(pipeline, &publisher, retry);
    let result = bridge.run(telegrams, shutdown_on(tokio::signal::ctrl_c())).await;

    publisher.shutdown().await;
    result?;
    Ok(())
}
