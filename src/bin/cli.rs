//! Wattboard CLI
//!
//! Query a running Wattboard server, watch a live feed, and export stored
//! measurements.

use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use wattboard::api::dto::{
    ConsumptionChartResponse, HealthResponse, HomeListResponse, MeasurementsResponse,
    ProductionChartResponse,
};
use wattboard::display::{
    format_cents, format_date_time, format_hour, format_time_only, home_display_name,
    price_level_indicator, status_indicator, trim_string,
};
use wattboard::feed::{
    ChartView, CurrentValues, FeedConfig, LiveFeed, MeasurementStore, ReconnectPolicy, SseDecoder,
};
use wattboard::live::PRICE_EVENT;
use wattboard::model::PriceInfo;

const PRICE_WAIT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "wattboard")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Wattboard - home energy dashboard", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// API server URL
    #[arg(long, default_value = "http://localhost:8080", global = true)]
    api_url: String,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// List homes
    Homes,

    /// Show today's and tomorrow's hourly prices
    Prices {
        /// Home ID
        home: String,
    },

    /// Show daily consumption for the last week
    Consumption {
        /// Home ID
        home: String,
    },

    /// Show daily production for the last week
    Production {
        /// Home ID
        home: String,
    },

    /// Follow live power measurements (Ctrl-C to stop)
    Watch {
        /// Home ID
        home: String,

        /// Reconnect attempts after a dropped connection
        #[arg(long, default_value = "0")]
        reconnect: u32,
    },

    /// Export stored live measurements as CSV
    Export {
        /// Home ID
        home: String,

        /// Maximum number of records
        #[arg(short, long, default_value = "1000")]
        limit: usize,

        /// Only records after this time (RFC 3339 or e.g. now-2h)
        #[arg(long)]
        since: Option<String>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show server status
    Status,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let json = cli.format == "json";

    match cli.command {
        Commands::Homes => {
            let list: HomeListResponse = get_json(&client, &cli.api_url, "/api/homes").await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else if list.homes.is_empty() {
                println!("No homes stored yet.");
                println!();
                println!("Start the collector with a Tibber token:");
                println!("  TIBBER_API_TOKEN=... wattboard-collector");
            } else {
                println!("{:<32} {:<6} {:<12} {}", "Name", "Live", "Type", "ID");
                println!("{}", "-".repeat(90));
                for home in &list.homes {
                    println!(
                        "{:<32} {:<6} {:<12} {}",
                        trim_string(&home_display_name(home), 30),
                        status_indicator(home.realtime_enabled()),
                        trim_string(&home.home_type, 12),
                        home.id
                    );
                }
                println!();
                println!("{} home(s)", list.total);
            }
        }

        Commands::Prices { home } => {
            let info = fetch_price_info(&client, &cli.api_url, &home).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!(
                    "Current: {} {}/kWh {} (since {})",
                    format_cents(info.current.total),
                    info.current.currency,
                    price_level_indicator(info.current.level),
                    format_hour(&info.current.starts_at).unwrap_or_else(|| "-".to_string())
                );
                print_price_table("Today", &info.today, &info.current.starts_at);
                print_price_table("Tomorrow", &info.tomorrow, &info.current.starts_at);
            }
        }

        Commands::Consumption { home } => {
            let path = format!("/api/consumption/{}", urlencoding::encode(&home));
            let chart: ConsumptionChartResponse = get_json(&client, &cli.api_url, &path).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&chart)?);
            } else if chart.dates.is_empty() {
                println!("No consumption data for {}", home);
            } else {
                println!("{:<18} {:>12} {:>12}", "Date", "kWh", format!("Cost ({})", chart.currency));
                println!("{}", "-".repeat(44));
                for ((date, kwh), cost) in chart.dates.iter().zip(&chart.consumption).zip(&chart.cost) {
                    println!("{:<18} {:>12.2} {:>12.2}", local_date_time(date), kwh, cost);
                }
            }
        }

        Commands::Production { home } => {
            let path = format!("/api/production/{}", urlencoding::encode(&home));
            let chart: ProductionChartResponse = get_json(&client, &cli.api_url, &path).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&chart)?);
            } else if chart.dates.is_empty() {
                println!("No production data for {}", home);
            } else {
                println!("{:<18} {:>12} {:>12}", "Date", "kWh", "Profit");
                println!("{}", "-".repeat(44));
                for ((date, kwh), profit) in chart.dates.iter().zip(&chart.production).zip(&chart.profit) {
                    println!("{:<18} {:>12.2} {:>12.2}", local_date_time(date), kwh, profit);
                }
            }
        }

        Commands::Watch { home, reconnect } => {
            watch(&cli.api_url, &home, reconnect, json).await?;
        }

        Commands::Export {
            home,
            limit,
            since,
            output,
        } => {
            let mut path = format!("/api/measurements/{}?limit={}", urlencoding::encode(&home), limit);
            if let Some(since) = since {
                path.push_str(&format!("&since={}", urlencoding::encode(&since)));
            }
            let response: MeasurementsResponse = get_json(&client, &cli.api_url, &path).await?;

            match output {
                Some(path) => {
                    let file = std::fs::File::create(&path)
                        .with_context(|| format!("creating {:?}", path))?;
                    write_csv(file, &response)?;
                    println!("Exported {} records to {:?}", response.count, path);
                }
                None => {
                    write_csv(std::io::stdout().lock(), &response)?;
                }
            }
        }

        Commands::Status => {
            let response = client.get(format!("{}/health", cli.api_url)).send().await;

            let health: HealthResponse = match response {
                Ok(resp) => resp.json().await?,
                Err(e) => {
                    eprintln!("Cannot connect to Wattboard API at {}", cli.api_url);
                    eprintln!("Error: {}", e);
                    eprintln!();
                    eprintln!("Make sure the Wattboard server is running:");
                    eprintln!("  cargo run --bin wattboard");
                    std::process::exit(1);
                }
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&health)?);
            } else {
                println!("{} v{}", health.title, health.version);
                println!();
                println!("Status: {} {}", status_indicator(health.status == "healthy"), health.status);
                println!("Storage: {}", health.storage);
                println!("Live connections: {}", health.live_connections);
                println!("Uptime: {}", format_duration(health.uptime_seconds));

                if !health.tasks.is_empty() {
                    println!();
                    println!("Tasks:");
                    for (name, task) in &health.tasks {
                        let last = task
                            .last_success
                            .map(|t| format_date_time(&t.with_timezone(&Local)))
                            .unwrap_or_else(|| "never".to_string());
                        println!(
                            "  {} {:<24} runs {:<6} failures {:<4} last success {}",
                            status_indicator(task.is_healthy()),
                            name,
                            task.runs,
                            task.failures,
                            last
                        );
                        if let Some(error) = &task.last_error {
                            println!("      {}", trim_string(error, 100));
                        }
                    }
                }
            }
        }

        Commands::Config { output } => {
            let config = wattboard::config::generate_default_config();

            match output {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

/// GET a JSON resource, turning API errors into their message
async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    api_url: &str,
    path: &str,
) -> anyhow::Result<T> {
    let url = format!("{}{}", api_url.trim_end_matches('/'), path);
    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Cannot connect to Wattboard API at {}", api_url))?;

    let status = response.status();
    if !status.is_success() {
        let body: serde_json::Value = response.json().await.unwrap_or_default();
        let message = body["error"]["message"].as_str().unwrap_or("no details");
        bail!("Request failed ({}): {}", status, message);
    }

    Ok(response.json().await?)
}

/// Read the first `price-update` event from the price stream
async fn fetch_price_info(
    client: &reqwest::Client,
    api_url: &str,
    home: &str,
) -> anyhow::Result<PriceInfo> {
    let url = format!(
        "{}/events/price/{}",
        api_url.trim_end_matches('/'),
        urlencoding::encode(home)
    );
    let response = client
        .get(&url)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await
        .with_context(|| format!("Cannot connect to Wattboard API at {}", api_url))?;
    if !response.status().is_success() {
        bail!("Request failed ({}) for home {}", response.status(), home);
    }

    let mut decoder = SseDecoder::new();
    let mut body = response.bytes_stream();
    let first = tokio::time::timeout(PRICE_WAIT, async {
        while let Some(chunk) = body.next().await {
            for event in decoder.feed(&chunk?) {
                if event.event == PRICE_EVENT {
                    return Ok(event.data);
                }
            }
        }
        Err(anyhow!("Price stream ended without data"))
    })
    .await
    .map_err(|_| anyhow!("No price data available for {}", home))??;

    Ok(serde_json::from_str(&first)?)
}

fn print_price_table(title: &str, prices: &[wattboard::model::Price], current_start: &str) {
    println!();
    if prices.is_empty() {
        println!("{}: not published yet", title);
        return;
    }

    println!("{}:", title);
    for price in prices {
        let marker = if price.starts_at == current_start { " <" } else { "" };
        println!(
            "  {:<8} {:>6} {}{}",
            format_hour(&price.starts_at).unwrap_or_else(|| price.starts_at.clone()),
            format_cents(price.total),
            price_level_indicator(price.level),
            marker
        );
    }
}

async fn watch(api_url: &str, home: &str, reconnect: u32, json: bool) -> anyhow::Result<()> {
    let mut config = FeedConfig::new(api_url);
    if reconnect > 0 {
        config = config.with_reconnect(ReconnectPolicy {
            max_attempts: reconnect,
            ..Default::default()
        });
    }

    let store = MeasurementStore::with_capacity(3600);
    let feed = LiveFeed::connect(config, home, store.clone())?;
    let mut updates = feed.updates();
    eprintln!("Watching {} (Ctrl-C to stop)", home);

    let reason = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                feed.close();
                break None;
            }
            reason = feed.closed() => break Some(reason),
            update = updates.recv() => {
                let Ok(record) = update else { continue };
                if json {
                    println!("{}", serde_json::to_string(&record)?);
                } else if let Some(values) = CurrentValues::from_latest(Some(&record)) {
                    println!("[{}] {}", format_time_only(&record.timestamp.with_timezone(&Local)), values);
                }
            }
        }
    };

    let chart = ChartView::from_measurements(&store.measurements(home).await);
    eprintln!("Received {} records", chart.labels.len());

    match reason {
        Some(reason) => Err(anyhow!("Live feed closed: {}", reason)),
        None => Ok(()),
    }
}

fn write_csv<W: Write>(writer: W, response: &MeasurementsResponse) -> anyhow::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record([
        "timestamp",
        "power",
        "powerProduction",
        "minPower",
        "averagePower",
        "maxPower",
        "accumulatedConsumption",
        "accumulatedProduction",
        "lastMeterConsumption",
        "lastMeterProduction",
    ])?;

    for m in &response.measurements {
        csv.write_record([
            m.timestamp.map(|t| t.to_rfc3339()).unwrap_or_default(),
            m.power.to_string(),
            m.power_production.to_string(),
            m.min_power.to_string(),
            m.average_power.to_string(),
            m.max_power.to_string(),
            m.accumulated_consumption.to_string(),
            m.accumulated_production.to_string(),
            m.last_meter_consumption.to_string(),
            m.last_meter_production.to_string(),
        ])?;
    }

    csv.flush()?;
    Ok(())
}

/// Interval start in local time, or the raw value if it does not parse
fn local_date_time(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| format_date_time(&t.with_timezone(&Local)))
        .unwrap_or_else(|_| raw.to_string())
}

fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else if seconds < 86400 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else {
        format!("{}d {}h", seconds / 86400, (seconds % 86400) / 3600)
    }
}
