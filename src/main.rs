use base64::prelude::*;
use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use jobhost::config::{
    ExecutorConfig, LaunchErrorPolicy, ServerConfig, WorkerConfig, DEFAULT_COMPLETION_CAPACITY,
    DEFAULT_MAX_CONCURRENT_JOBS,
};
use jobhost::job::{Job, JobStatus};
use jobhost::server::Server;
use jobhost::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "jobhost")]
#[command(version)]
#[command(about = "Run shell commands as jobs over HTTP and track their completion")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the job server
    Server(ServerArgs),

    /// Job management commands
    Job {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: JobCommands,
    },
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Address to bind the HTTP API to
    #[arg(long, env = "JOBHOST_BIND", default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Port for the HTTP API
    #[arg(long, env = "JOBHOST_PORT", default_value = "8080")]
    port: u16,

    /// SQLite database URL (e.g. "sqlite://jobs.db"). Jobs are kept in memory when unset.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Stop accepting jobs once the in-memory store holds this many (default: no limit)
    #[arg(long, env = "JOBHOST_MAX_STORED_JOBS")]
    max_stored_jobs: Option<usize>,

    /// Identifier recorded on every job this server completes
    #[arg(long, env = "JOBHOST_WORKER_ID", default_value = "local")]
    worker_id: String,

    /// Directory exported as HOME to executed commands
    #[arg(long, env = "JOBHOST_SCRATCH_DIR", default_value = "/tmp")]
    scratch_dir: PathBuf,

    /// Shell used to run commands as `<shell> -c <command>`
    #[arg(long, env = "JOBHOST_SHELL", default_value = "/bin/sh")]
    shell: PathBuf,

    /// Capacity of the completion channel
    #[arg(long, env = "JOBHOST_COMPLETION_CAPACITY", default_value_t = DEFAULT_COMPLETION_CAPACITY)]
    completion_capacity: usize,

    /// Maximum number of jobs executing at once
    #[arg(long, env = "JOBHOST_MAX_CONCURRENT_JOBS", default_value_t = DEFAULT_MAX_CONCURRENT_JOBS)]
    max_concurrent_jobs: usize,

    /// Kill commands that run longer than this many seconds (default: no limit)
    #[arg(long, env = "JOBHOST_EXECUTION_TIMEOUT_SECS")]
    execution_timeout_secs: Option<u64>,

    /// Leave jobs pending when their command cannot be launched, instead of
    /// recording an execution error
    #[arg(long, env = "JOBHOST_ABANDON_ON_LAUNCH_ERROR")]
    abandon_on_launch_error: bool,

    /// Log output format
    #[arg(long, env = "JOBHOST_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

// =============================================================================
// Client Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Server address
    #[arg(long, short = 'a', default_value = "http://127.0.0.1:8080")]
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

#[derive(clap::Subcommand, Debug)]
enum JobCommands {
    /// Submit a new job
    Submit {
        /// The command to execute (e.g., "echo hello")
        command: String,
    },
    /// Get status of a specific job
    Status {
        /// The job ID (UUID)
        job_id: String,
    },
    /// List all jobs
    List,
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct JobSubmitOutput {
    job_id: String,
}

#[derive(Serialize)]
struct JobListOutput {
    jobs: Vec<Job>,
    total_count: usize,
}

// =============================================================================
// Helper Functions
// =============================================================================

fn job_status_to_string(status: JobStatus) -> String {
    match status {
        JobStatus::Pending => "PENDING".to_string(),
        JobStatus::Succeeded => "SUCCEEDED".to_string(),
        JobStatus::Failed => "FAILED".to_string(),
        JobStatus::ExecutionError => "EXEC_ERROR".to_string(),
    }
}

fn init_logging(format: &LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

/// Turn a non-2xx response into an error carrying the server's message.
async fn check_response(
    response: reqwest::Response,
) -> Result<reqwest::Response, Box<dyn std::error::Error>> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(v) => format!(
            "{}: {}",
            v["message"].as_str().unwrap_or_default(),
            v["error"].as_str().unwrap_or_default()
        ),
        Err(_) => body,
    };
    Err(format!("server returned {}: {}", status, detail).into())
}

// =============================================================================
// Server Implementation
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(&args.log_format);

    let listen_addr = SocketAddr::new(args.bind, args.port);

    let executor = ExecutorConfig {
        shell: args.shell,
        scratch_dir: args.scratch_dir,
        timeout: args.execution_timeout_secs.map(Duration::from_secs),
        ..ExecutorConfig::default()
    };

    let worker = WorkerConfig {
        worker_id: args.worker_id,
        max_concurrent_jobs: args.max_concurrent_jobs,
        launch_error_policy: if args.abandon_on_launch_error {
            LaunchErrorPolicy::Abandon
        } else {
            LaunchErrorPolicy::Report
        },
        executor,
    };

    let config = ServerConfig {
        listen_addr,
        database_url: args.database_url,
        max_stored_jobs: args.max_stored_jobs,
        completion_capacity: args.completion_capacity,
        worker,
    };

    let shutdown = install_shutdown_handler()?;
    let server = Server::new(config).await?;
    let stats = server.run(shutdown).await?;

    tracing::info!(
        applied = stats.applied,
        failed = stats.failed,
        "Server stopped"
    );
    Ok(())
}

// =============================================================================
// Client Command Handlers
// =============================================================================

async fn handle_job_submit(
    client: &reqwest::Client,
    args: &ClientArgs,
    command: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = client
        .post(format!("{}/job", args.addr))
        .json(&serde_json::json!({ "cmd_string": command }))
        .send()
        .await?;
    let job_id: String = check_response(response).await?.json().await?;

    match args.output {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&JobSubmitOutput { job_id })?
            );
        }
        OutputFormat::Table => {
            println!("Job submitted successfully!");
            println!("Job ID: {}", job_id);
        }
    }
    Ok(())
}

async fn handle_job_status(
    client: &reqwest::Client,
    args: &ClientArgs,
    job_id: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = client
        .get(format!("{}/job/{}", args.addr, job_id))
        .send()
        .await?;
    let job: Job = check_response(response).await?.json().await?;

    match args.output {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        OutputFormat::Table => {
            println!("Job ID:     {}", job.id);
            println!("Command:    {}", job.command);
            println!("Status:     {}", job_status_to_string(job.status));
            if let Some(worker) = &job.worker {
                println!("Worker:     {}", worker);
            }
            println!("Created:    {}", job.created_at);
            if let Some(completed_at) = job.completed_at {
                println!("Completed:  {}", completed_at);
            }
            if !job.output.is_empty() {
                let decoded = BASE64_STANDARD.decode(&job.output)?;
                println!("Output:");
                for line in String::from_utf8_lossy(&decoded).lines() {
                    println!("  {}", line);
                }
            }
        }
    }
    Ok(())
}

async fn handle_job_list(
    client: &reqwest::Client,
    args: &ClientArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = client.get(format!("{}/job", args.addr)).send().await?;
    let jobs: Vec<Job> = check_response(response).await?.json().await?;

    match args.output {
        OutputFormat::Json => {
            let output = JobListOutput {
                total_count: jobs.len(),
                jobs,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            if jobs.is_empty() {
                println!("No jobs found.");
            } else {
                println!("{:<38} {:<12} {:<10} COMMAND", "JOB ID", "STATUS", "WORKER");
                println!("{}", "-".repeat(80));

                for job in &jobs {
                    let worker = job.worker.as_deref().unwrap_or("-");
                    let cmd_display = if job.command.chars().count() > 20 {
                        format!("{}...", job.command.chars().take(17).collect::<String>())
                    } else {
                        job.command.clone()
                    };
                    println!(
                        "{:<38} {:<12} {:<10} {}",
                        job.id,
                        job_status_to_string(job.status),
                        worker,
                        cmd_display
                    );
                }
                println!();
                println!("{} jobs", jobs.len());
            }
        }
    }
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
        Commands::Job { client, command } => {
            let http = reqwest::Client::new();
            let result = match command {
                JobCommands::Submit { command: cmd } => handle_job_submit(&http, &client, cmd).await,
                JobCommands::Status { job_id } => handle_job_status(&http, &client, job_id).await,
                JobCommands::List => handle_job_list(&http, &client).await,
            };
            if let Err(e) = result {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
