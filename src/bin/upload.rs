use anyhow::{bail, Context};
use chunkstream_uploader::config::UploaderConfig;
use chunkstream_uploader::metrics::{start_metrics_server, MetricsConfig};
use chunkstream_uploader::{
    CancellationToken, SessionStore, UploadEvent, UploadOrchestrator, UploadRequest,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: chunkstream-upload <FILE> [--content-type TYPE] [--purpose PURPOSE] \
[--config FILE] [--resume SESSION_ID] [--retry-completion SESSION_ID] [--metrics-addr ADDR]";

#[derive(Debug, Default)]
struct Args {
    file: Option<PathBuf>,
    content_type: Option<String>,
    purpose: Option<String>,
    config: Option<PathBuf>,
    resume: Option<String>,
    retry_completion: Option<String>,
    metrics_addr: Option<SocketAddr>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);

    while let Some(arg) = it.next() {
        let mut value = |name: &str| it.next().with_context(|| format!("{name} needs a value"));
        match arg.as_str() {
            "--content-type" => args.content_type = Some(value("--content-type")?),
            "--purpose" => args.purpose = Some(value("--purpose")?),
            "--config" => args.config = Some(value("--config")?.into()),
            "--resume" => args.resume = Some(value("--resume")?),
            "--retry-completion" => args.retry_completion = Some(value("--retry-completion")?),
            "--metrics-addr" => {
                args.metrics_addr = Some(value("--metrics-addr")?.parse().context("bad --metrics-addr")?)
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            flag if flag.starts_with("--") => bail!("unknown flag {flag}\n{USAGE}"),
            path => args.file = Some(PathBuf::from(path)),
        }
    }

    if args.file.is_none() && args.resume.is_none() && args.retry_completion.is_none() {
        bail!("{USAGE}");
    }
    Ok(args)
}

/// Best guess from the extension; the control plane may override it.
fn guess_content_type(path: &std::path::Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("pdf") => "application/pdf",
        Some("json") => "application/json",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

fn print_event(event: &UploadEvent) {
    match event {
        UploadEvent::StatusChanged { status, .. } => println!("  status    {status}"),
        UploadEvent::Progress {
            percentage,
            uploaded_bytes,
            total_bytes,
            ..
        } => println!("  progress  {percentage:5.1}%  ({uploaded_bytes}/{total_bytes} bytes)"),
        UploadEvent::ChunkRetrying {
            part_number,
            attempt,
            delay_ms,
            ..
        } => println!("  retry     chunk {part_number} attempt {attempt} failed, next in {delay_ms} ms"),
        UploadEvent::UrlReissued { part_number, .. } => {
            println!("  reissue   chunk {part_number} got a fresh URL")
        }
        _ => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = parse_args()?;

    let config = match &args.config {
        Some(path) => UploaderConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => UploaderConfig::default(),
    }
    .apply_env();

    if let Some(addr) = args.metrics_addr {
        start_metrics_server(MetricsConfig::with_addr(addr))?;
    }

    let mut orchestrator = UploadOrchestrator::from_config(&config)?;
    if let Some(db) = &config.session_db {
        let store = SessionStore::new(db)
            .await
            .with_context(|| format!("opening session database {db}"))?;
        orchestrator = orchestrator.with_session_store(Arc::new(store));
    }

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ninterrupted, cancelling upload");
            on_ctrl_c.cancel();
        }
    });

    let mut events = orchestrator.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            print_event(&event);
            if event.is_terminal() {
                break;
            }
        }
    });

    let stored = |id: &str| {
        let id = id.to_string();
        let store = orchestrator.session_store().cloned();
        async move {
            let Some(store) = store else {
                bail!("resuming needs sessionDb in the config");
            };
            store
                .load(&id)
                .await?
                .with_context(|| format!("no session {id}"))
        }
    };

    let report = if let Some(id) = &args.resume {
        let session = stored(id).await?;
        println!("Resuming {} ({})", session.filename, session.session_id);
        orchestrator.resume_upload(session, &cancel).await
    } else if let Some(id) = &args.retry_completion {
        let session = stored(id).await?;
        println!("Retrying completion of {}", session.session_id);
        orchestrator.retry_completion(session, &cancel).await
    } else {
        let Some(file) = args.file.clone() else {
            bail!("{USAGE}");
        };
        let content_type = args
            .content_type
            .clone()
            .unwrap_or_else(|| guess_content_type(&file).to_string());
        let mut request = UploadRequest::new(file.clone(), content_type);
        if let Some(purpose) = &args.purpose {
            request = request.with_purpose(purpose);
        }
        println!("Uploading {}", file.display());
        orchestrator.start_upload(request, &cancel).await
    };

    let _ = printer.await;

    let session_id = report.session.session_id.clone();
    match report.into_result() {
        Ok(session) => {
            println!("\nDone: session {}", session.session_id);
            if let Some(object) = &session.object {
                println!("{}", serde_json::to_string_pretty(object)?);
            }
            Ok(())
        }
        Err(err) => {
            let phase = err
                .phase()
                .map(|p| p.to_string())
                .unwrap_or_else(|| err.kind().as_str().to_string());
            eprintln!("\nUpload failed during {phase}: {err}");
            eprintln!("session {session_id}");
            std::process::exit(1);
        }
    }
}
