//! gsm-modem: send and receive SMS through a GSM modem from the command line

mod settings;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use modem_core::{Modem, ModemEvent, SendOptions};
use modem_detect::{probe_port, PortScanner, ProbeConfig};
use modem_sim::{run_virtual_modem_task, VirtualModem};
use sms_pdu::{Alphabet, ValidityPeriod};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use settings::Config;

#[derive(Parser)]
#[command(name = "gsm-modem")]
#[command(about = "Send and receive SMS through a GSM modem", version)]
struct Cli {
    /// Config file (default: ~/.config/gsm-modem/config.json)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Serial port, overriding the config file
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Baud rate, overriding the config file
    #[arg(short, long, global = true)]
    baud: Option<u32>,

    /// Talk to a built-in virtual modem instead of a serial port
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports
    Ports {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Check whether a port answers AT commands
    Probe {
        /// Port to probe (defaults to the configured port)
        port: Option<String>,
    },

    /// Show modem identity, network and SIM storage
    Info,

    /// Show signal quality
    Signal,

    /// Send an SMS
    Send {
        /// Recipient number
        number: String,

        /// Message text
        text: String,

        /// Class 0 message shown immediately on the recipient's screen
        #[arg(long)]
        flash: bool,

        /// Send as 8-bit data, one octet per character (Latin-1 text only)
        #[arg(long)]
        binary: bool,

        /// Do not request a delivery report
        #[arg(long)]
        no_report: bool,

        /// Relative validity period in minutes
        #[arg(long, value_name = "MINUTES")]
        validity: Option<u32>,
    },

    /// List stored messages, with concatenated parts merged
    Inbox {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Read one stored message
    Read { index: u32 },

    /// Delete stored messages
    Delete {
        /// Storage index to delete
        #[arg(required_unless_present = "all")]
        index: Option<u32>,

        /// Delete every stored message
        #[arg(long, conflicts_with = "index")]
        all: bool,
    },

    /// Send a USSD code and wait for the network reply
    Ussd {
        code: String,

        /// Seconds to wait for the reply
        #[arg(long, default_value = "30")]
        wait: u64,
    },

    /// List networks in range (can take a minute)
    Operators,

    /// Send a raw AT command and print the response lines
    At {
        command: String,

        /// Timeout in milliseconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Print modem events until interrupted
    Listen {
        /// Also print every line written and received
        #[arg(long)]
        traffic: bool,
    },

    /// Print the effective configuration, optionally saving it
    Config {
        /// Write the configuration back to the config file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "gsm_modem=info,modem_core=info,modem_detect=info,sms_pdu=info,modem_sim=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = &cli.port {
        config.serial.port = port.clone();
    }
    if let Some(baud) = cli.baud {
        config.serial.baud_rate = baud;
    }

    match cli.command {
        Commands::Ports { json } => list_ports(json),
        Commands::Probe { port } => probe(port.unwrap_or(config.serial.port), config.serial.baud_rate).await,
        Commands::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if save {
                let path = config.save(cli.config.as_deref())?;
                println!("Saved to {}", path.display());
            }
            Ok(())
        }
        command => {
            let (modem, events) = connect(&config, cli.simulate).await?;
            let result = run(&modem, events, command).await;
            modem.close().await?;
            result
        }
    }
}

async fn connect(config: &Config, simulate: bool) -> Result<(Modem, mpsc::Receiver<ModemEvent>)> {
    if simulate {
        info!("Using virtual modem");
        let (driver, device) = tokio::io::duplex(4096);
        let (sim_tx, sim_rx) = mpsc::channel(1);
        tokio::spawn(async move {
            // the task stops when its command channel closes
            let _sim_tx = sim_tx;
            run_virtual_modem_task(device, VirtualModem::default(), sim_rx).await
        });
        return Ok(Modem::spawn(driver, config.modem.clone()).await?);
    }

    info!(
        "Opening {} at {} baud",
        config.serial.port, config.serial.baud_rate
    );
    Modem::open(&config.serial, config.modem.clone())
        .await
        .with_context(|| format!("Failed to open modem on {}", config.serial.port))
}

fn list_ports(json: bool) -> Result<()> {
    let ports = PortScanner::new().enumerate_ports()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        let ids = match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => format!("{:04x}:{:04x}", vid, pid),
            _ => "-".to_string(),
        };
        println!(
            "{:<20} {:<10} {:<14} {}",
            port.port,
            ids,
            format!("{:?}", port.classification),
            port.hint.or(port.product.as_deref()).unwrap_or("")
        );
    }
    Ok(())
}

async fn probe(port: String, baud_rate: u32) -> Result<()> {
    let result = probe_port(&port, baud_rate, ProbeConfig::default()).await?;
    println!(
        "{}: modem found ({} {})",
        port,
        result.manufacturer.as_deref().unwrap_or("unknown"),
        result.model.as_deref().unwrap_or("")
    );
    Ok(())
}

async fn run(modem: &Modem, mut events: mpsc::Receiver<ModemEvent>, command: Commands) -> Result<()> {
    match command {
        Commands::Info => {
            println!("IMEI:      {}", modem.serial_number().await?);
            match modem.own_number().await {
                Ok(own) => println!("Number:    {}", own.number),
                Err(e) => println!("Number:    unavailable ({})", e),
            }
            let operator = modem.current_operator().await?;
            println!("Operator:  {}", operator.name.as_deref().unwrap_or("none"));
            let signal = modem.signal_quality().await?;
            println!("Signal:    {} (-{} dBm)", signal.quality, signal.strength);
            let memory = modem.check_sim_memory().await?;
            println!("Storage:   {}/{}", memory.used, memory.total);
        }
        Commands::Signal => {
            let signal = modem.signal_quality().await?;
            println!("{} (-{} dBm)", signal.quality, signal.strength);
        }
        Commands::Send {
            number,
            text,
            flash,
            binary,
            no_report,
            validity,
        } => {
            let options = SendOptions {
                flash,
                alphabet: binary.then_some(Alphabet::Data8),
                validity: validity.map(|minutes| ValidityPeriod::Relative { minutes }),
                status_report: !no_report,
                ..Default::default()
            };
            let sent = modem.send_sms(&number, &text, &options).await?;
            println!("Sent to {} in {} part(s)", sent.recipient, sent.parts.len());
        }
        Commands::Inbox { json } => {
            let inbox = modem.get_inbox().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&inbox)?);
            } else {
                for message in &inbox {
                    let indexes: Vec<String> = message.indexes.iter().map(u32::to_string).collect();
                    let incomplete = if message.is_complete() { "" } else { " (incomplete)" };
                    println!(
                        "[{}] {} {:?}{}",
                        indexes.join(","),
                        message.address,
                        message.status,
                        incomplete
                    );
                    println!("    {}", message.text);
                }
                println!("{} message(s)", inbox.len());
            }
        }
        Commands::Read { index } => {
            let sms = modem.read_sms(index).await?;
            println!("From:  {}", sms.pdu.address());
            if let Some(timestamp) = sms.pdu.timestamp() {
                println!("Sent:  {}", timestamp);
            }
            println!("{}", sms.pdu.text());
        }
        Commands::Delete { index, all } => {
            if all {
                modem.delete_all_sms().await?;
                println!("Deleted all messages");
            } else if let Some(index) = index {
                modem.delete_sms(index).await?;
                println!("Deleted message {}", index);
            }
        }
        Commands::Ussd { code, wait } => {
            modem.send_ussd(&code).await?;
            let reply = tokio::time::timeout(Duration::from_secs(wait), async {
                while let Some(event) = events.recv().await {
                    if let ModemEvent::IncomingUssd { text, follow, .. } = event {
                        return Some((text, follow));
                    }
                }
                None
            })
            .await;
            match reply {
                Ok(Some((text, follow))) => println!("{}\n({})", text, follow),
                Ok(None) => bail!("Modem closed before the USSD reply arrived"),
                Err(_) => bail!("No USSD reply within {} s", wait),
            }
        }
        Commands::Operators => {
            for operator in modem.available_operators().await? {
                println!(
                    "{:<6} {:<24} status {}",
                    operator.numeric, operator.long_name, operator.status
                );
            }
        }
        Commands::At { command, timeout } => {
            let lines = modem
                .execute(&command, timeout.map(Duration::from_millis), false)
                .await?;
            for line in lines {
                println!("{}", line);
            }
        }
        Commands::Listen { traffic } => {
            println!("Listening for modem events, Ctrl-C to stop");
            loop {
                tokio::select! {
                    event = events.recv() => {
                        let Some(event) = event else { break };
                        if let Some(text) = describe(&event, traffic) {
                            println!("{}", text);
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
        Commands::Ports { .. } | Commands::Probe { .. } | Commands::Config { .. } => {}
    }
    Ok(())
}

/// One line for an event, or `None` for traffic when not requested
fn describe(event: &ModemEvent, traffic: bool) -> Option<String> {
    let text = match event {
        ModemEvent::WriteToModem { data } if traffic => format!(">> {}", data.trim_end()),
        ModemEvent::DataReceived { data } if traffic => format!("<< {}", data),
        ModemEvent::WriteToModem { .. } | ModemEvent::DataReceived { .. } => return None,
        ModemEvent::CommandResponse { .. } => return None,
        ModemEvent::NewSms { index } => format!("New message at index {}", index),
        ModemEvent::IncomingCall { number, .. } => format!("Incoming call from {}", number),
        ModemEvent::IncomingUssd { text, follow, .. } => format!("USSD: {} ({})", text, follow),
        ModemEvent::MemoryFull { used, total } => format!("SIM storage full ({}/{})", used, total),
        other => format!("{:?}", other),
    };
    Some(text)
}
