use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio_stream::StreamExt;
use tonic::transport::Channel;
use tracing_subscriber::EnvFilter;

use flight_poll::config::{DatasetConfig, QueryPolicy, ServerConfig};
use flight_poll::metrics::init_metrics;
use flight_poll::node::Node;
use flight_poll::proto::flight_poll_service_client::FlightPollServiceClient;
use flight_poll::proto::query_descriptor::Kind;
use flight_poll::proto::{Action, ListDatasetsRequest, PollInfo, QueryDescriptor, Ticket};
use flight_poll::query::{QueryCatalog, QueryClass};
use flight_poll::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "flight-poll")]
#[command(version)]
#[command(about = "Long-running query server with a polling protocol and streamed results")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start a flight-poll server
    Server(ServerArgs),

    /// Submit a query and poll it until the result is ready
    Poll {
        #[command(flatten)]
        client: ClientArgs,

        /// Query class to submit (e.g. "short")
        query: String,

        /// Seconds between polls
        #[arg(long, default_value = "1")]
        interval: u64,

        /// Give up after this many seconds
        #[arg(long, default_value = "600")]
        max_duration: u64,
    },

    /// Fetch a static dataset
    Get {
        #[command(flatten)]
        client: ClientArgs,

        /// Dataset name (e.g. "sample" or "sample-delay")
        dataset: String,
    },

    /// List static datasets
    List {
        #[command(flatten)]
        client: ClientArgs,
    },

    /// Send an echo action
    Echo {
        #[command(flatten)]
        client: ClientArgs,

        text: String,
    },
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Address to bind the gRPC server to
    #[arg(long, default_value = "127.0.0.1")]
    host: std::net::IpAddr,

    /// Port to listen on for gRPC
    #[arg(long, default_value = "8815")]
    port: u16,

    /// Port for the web dashboard (optional)
    #[arg(long)]
    dashboard_port: Option<u16>,

    /// Jobs expire after this many declared durations
    #[arg(long, default_value = "2")]
    expiry_factor: u32,

    /// Maximum progress checkpoints per job
    #[arg(long, default_value = "10")]
    max_checkpoints: u32,

    /// Maximum number of tracked jobs
    #[arg(long, default_value = "10000")]
    max_jobs: usize,

    /// Delay before the first batch of the sample-delay dataset
    #[arg(long, default_value = "70")]
    sample_delay_secs: u64,

    /// Maximum rows per streamed batch
    #[arg(long, default_value = "500")]
    batch_rows: usize,

    /// Add or override a query class, format "NAME=SECS[:ROWS]"
    /// Example: --query-class quick=5:100
    #[arg(long = "query-class")]
    query_classes: Vec<QueryClass>,
}

// =============================================================================
// Client Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Server address
    #[arg(long, short = 'a', default_value = "http://127.0.0.1:8815")]
    addr: String,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct PollStepOutput {
    handle: Option<String>,
    progress: Option<f64>,
    expires_at_ms: Option<i64>,
}

#[derive(Serialize)]
struct FetchOutput {
    name: String,
    polls: usize,
    batches: usize,
    rows: usize,
    elapsed_secs: f64,
}

#[derive(Serialize)]
struct DatasetOutput {
    name: String,
    total_records: i64,
    locations: Vec<String>,
}

// =============================================================================
// Helper Functions
// =============================================================================

async fn create_client(
    args: &ClientArgs,
) -> Result<FlightPollServiceClient<Channel>, Box<dyn std::error::Error>> {
    let channel = Channel::from_shared(args.addr.clone())?.connect().await?;
    Ok(FlightPollServiceClient::new(channel))
}

fn poll_handle(info: &PollInfo) -> Option<String> {
    match info.descriptor.as_ref().and_then(|d| d.kind.as_ref()) {
        Some(Kind::PollHandle(handle)) => Some(handle.clone()),
        _ => None,
    }
}

fn first_ticket(info: &PollInfo) -> Option<Ticket> {
    info.info
        .as_ref()
        .and_then(|i| i.endpoints.first())
        .and_then(|e| e.ticket.clone())
}

/// Drain a DoGet stream, returning (batches, rows).
async fn fetch_ticket(
    client: &mut FlightPollServiceClient<Channel>,
    ticket: Ticket,
) -> Result<(usize, usize), Box<dyn std::error::Error>> {
    let mut stream = client.do_get(ticket).await?.into_inner();
    let mut batches = 0;
    let mut rows = 0;
    while let Some(batch) = stream.next().await {
        let batch = batch?;
        batches += 1;
        rows += batch.values.len();
    }
    Ok((batches, rows))
}

fn print_fetch(output: FetchOutput, format: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
        OutputFormat::Table => {
            println!("Result:   {}", output.name);
            if output.polls > 0 {
                println!("Polls:    {}", output.polls);
            }
            println!("Batches:  {}", output.batches);
            println!("Rows:     {}", output.rows);
            println!("Elapsed:  {:.1}s", output.elapsed_secs);
        }
    }
    Ok(())
}

// =============================================================================
// Server Implementation
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Metrics exporter unavailable");
    }

    let listen_addr = SocketAddr::new(args.host, args.port);
    let mut config = ServerConfig::new(listen_addr)
        .with_policy(QueryPolicy {
            expiry_factor: args.expiry_factor,
            max_checkpoints: args.max_checkpoints,
            max_jobs: args.max_jobs,
            ..QueryPolicy::default()
        })
        .with_datasets(DatasetConfig {
            sample_delay: Duration::from_secs(args.sample_delay_secs),
            batch_rows: args.batch_rows,
            ..DatasetConfig::default()
        });

    if !args.query_classes.is_empty() {
        let catalog = args
            .query_classes
            .into_iter()
            .fold(QueryCatalog::default(), QueryCatalog::with_class);
        config = config.with_catalog(catalog);
    }
    if let Some(port) = args.dashboard_port {
        config = config.with_dashboard(SocketAddr::new(args.host, port));
    }

    tracing::info!(
        listen_addr = %config.listen_addr,
        dashboard_addr = ?config.dashboard_addr,
        classes = ?config.catalog.classes().map(|c| c.name.as_str()).collect::<Vec<_>>(),
        expiry_factor = config.policy.expiry_factor,
        "Starting flight-poll server"
    );

    let shutdown = install_shutdown_handler()?;
    Node::new(config).run(shutdown).await
}

// =============================================================================
// Client Command Handlers
// =============================================================================

async fn handle_poll(
    client: &mut FlightPollServiceClient<Channel>,
    query: String,
    interval: Duration,
    max_duration: Duration,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let started = Instant::now();
    let mut info = client
        .poll_query(QueryDescriptor {
            kind: Some(Kind::Query(query.clone())),
        })
        .await?
        .into_inner();
    let mut polls = 1;

    while let Some(handle) = poll_handle(&info) {
        if let OutputFormat::Table = output_format {
            println!(
                "{:<12} progress {:>5.1}%",
                handle,
                info.progress.unwrap_or(0.0) * 100.0
            );
        } else {
            let step = PollStepOutput {
                handle: Some(handle.clone()),
                progress: info.progress,
                expires_at_ms: info.expiration_time_ms,
            };
            println!("{}", serde_json::to_string(&step)?);
        }

        if started.elapsed() >= max_duration {
            eprintln!(
                "Error: query {} still running after {}s",
                query,
                max_duration.as_secs()
            );
            std::process::exit(1);
        }

        tokio::time::sleep(interval).await;
        info = client
            .poll_query(QueryDescriptor {
                kind: Some(Kind::PollHandle(handle)),
            })
            .await?
            .into_inner();
        polls += 1;
    }

    let Some(ticket) = first_ticket(&info) else {
        eprintln!("Error: completed response carried no endpoint");
        std::process::exit(1);
    };
    let (batches, rows) = fetch_ticket(client, ticket).await?;

    print_fetch(
        FetchOutput {
            name: query,
            polls,
            batches,
            rows,
            elapsed_secs: started.elapsed().as_secs_f64(),
        },
        output_format,
    )
}

async fn handle_get(
    client: &mut FlightPollServiceClient<Channel>,
    dataset: String,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let started = Instant::now();
    let (batches, rows) = fetch_ticket(
        client,
        Ticket {
            ticket: dataset.clone().into_bytes(),
        },
    )
    .await?;

    print_fetch(
        FetchOutput {
            name: dataset,
            polls: 0,
            batches,
            rows,
            elapsed_secs: started.elapsed().as_secs_f64(),
        },
        output_format,
    )
}

async fn handle_list(
    client: &mut FlightPollServiceClient<Channel>,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut stream = client
        .list_datasets(ListDatasetsRequest {})
        .await?
        .into_inner();

    let mut datasets = Vec::new();
    while let Some(info) = stream.next().await {
        let info = info?;
        let name = match info.descriptor.and_then(|d| d.kind) {
            Some(Kind::Dataset(name)) | Some(Kind::Query(name)) => name,
            _ => "-".to_string(),
        };
        datasets.push(DatasetOutput {
            name,
            total_records: info.total_records,
            locations: info
                .endpoints
                .into_iter()
                .flat_map(|e| e.locations)
                .collect(),
        });
    }

    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&datasets)?),
        OutputFormat::Table => {
            if datasets.is_empty() {
                println!("No datasets found.");
            } else {
                println!("{:<16} {:<8} LOCATION", "DATASET", "ROWS");
                println!("{}", "-".repeat(50));
                for dataset in &datasets {
                    println!(
                        "{:<16} {:<8} {}",
                        dataset.name,
                        dataset.total_records,
                        dataset.locations.join(",")
                    );
                }
            }
        }
    }
    Ok(())
}

async fn handle_echo(
    client: &mut FlightPollServiceClient<Channel>,
    text: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = client
        .do_action(Action {
            r#type: "echo".to_string(),
            body: text.into_bytes(),
        })
        .await?
        .into_inner();
    println!("{}", String::from_utf8_lossy(&response.body));
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => {
            run_server(server_args).await?;
        }
        Commands::Poll {
            client,
            query,
            interval,
            max_duration,
        } => {
            let mut grpc_client = create_client(&client).await?;
            handle_poll(
                &mut grpc_client,
                query,
                Duration::from_secs(interval),
                Duration::from_secs(max_duration),
                &client.output,
            )
            .await?;
        }
        Commands::Get { client, dataset } => {
            let mut grpc_client = create_client(&client).await?;
            handle_get(&mut grpc_client, dataset, &client.output).await?;
        }
        Commands::List { client } => {
            let mut grpc_client = create_client(&client).await?;
            handle_list(&mut grpc_client, &client.output).await?;
        }
        Commands::Echo { client, text } => {
            let mut grpc_client = create_client(&client).await?;
            handle_echo(&mut grpc_client, text).await?;
        }
    }

    Ok(())
}
