mod cli;

use dvrdash::{config, ingest, probe};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use dd_av::{Mp4BoxPackager, ToolRegistry};
use dd_core::config::{CodecHint, Config};
use dd_media::Recorder;
use dd_server::OriginServer;
use std::path::{Path, PathBuf};
use std::sync::Arc;

struct RecordArgs {
    input: PathBuf,
    out: Option<PathBuf>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<f64>,
    codec: Option<CodecHint>,
    fragmented: bool,
    dash: Option<String>,
    segment_duration: Option<f64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults from the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "dvrdash=trace,dd_media=trace,dd_mp4=debug,dd_av=debug,dd_server=debug,tower_http=debug".to_string()
        } else {
            "dvrdash=info,dd_media=info,dd_av=info,dd_server=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt().with_env_filter(&env_filter).init();

    match cli.command {
        Commands::Record {
            input,
            out,
            width,
            height,
            fps,
            codec,
            fragmented,
            dash,
            segment_duration,
        } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            record(
                &config,
                RecordArgs {
                    input,
                    out,
                    width,
                    height,
                    fps,
                    codec,
                    fragmented,
                    dash,
                    segment_duration,
                },
            )
        }
        Commands::Serve {
            host,
            port,
            output_dir,
            publish,
            register,
        } => {
            let mut config = config::load_config_or_default(cli.config.as_deref())?;

            // CLI flags override the file.
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(dir) = output_dir {
                config.server.output_dir = dir;
            }

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(serve(config, publish, register))
        }
        Commands::Probe { file, json } => probe_file(&file, json),
        Commands::CheckTools => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            check_tools(&config)
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("dvrdash {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn record(config: &Config, args: RecordArgs) -> Result<()> {
    let data = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read input file: {:?}", args.input))?;

    let out_dir = args
        .out
        .unwrap_or_else(|| config.recording.output_dir.clone());
    let opts = ingest::IngestOptions {
        width: args.width,
        height: args.height,
        frame_rate: args.fps,
        codec: args.codec.unwrap_or(config.recording.codec),
        fragmented: args.fragmented,
    };

    // Resolve the packager up front so a missing MP4Box fails before the
    // recording is written.
    let packager = match args.dash {
        Some(_) => {
            let tools = ToolRegistry::discover(&config.tools);
            Some(Mp4BoxPackager::from_registry(&tools)?)
        }
        None => None,
    };

    let mut recorder = Recorder::new().with_relock_policy(config.recording.relock_policy);
    let summary = ingest::ingest_dhav(&data, &mut recorder, &out_dir, &opts)?;

    let path = recorder.stop_recording()?;
    println!("Recorded {}", path.display());
    println!(
        "  Frames: {} read, {} video, {} written, {} skipped, {} rejected",
        summary.frames_read,
        summary.video_frames,
        summary.samples_written,
        summary.frames_skipped,
        summary.frames_rejected
    );
    if let Some(codec) = recorder.codec() {
        println!("  Codec: {codec}");
    }
    if args.fragmented {
        println!("  Fragments: {}", recorder.fragments_written());
    }
    if let Some(ref err) = summary.container_error {
        println!("  Stopped early: {err}");
    }

    if let (Some(name), Some(packager)) = (args.dash, packager) {
        let segment_duration = args
            .segment_duration
            .unwrap_or(config.dash.segment_duration_secs);
        let rt = tokio::runtime::Runtime::new()?;
        let dir = rt.block_on(recorder.generate_mpd(&packager, &name, segment_duration))?;
        println!("DASH stream '{name}' written to {}", dir.display());
    }

    Ok(())
}

async fn serve(
    config: Config,
    publish: Vec<(String, PathBuf)>,
    register: Vec<(String, PathBuf)>,
) -> Result<()> {
    config::validate_config(&config)?;

    let mut server = OriginServer::new(config.server.clone());
    if !publish.is_empty() {
        let tools = ToolRegistry::discover(&config.tools);
        let packager = Mp4BoxPackager::from_registry(&tools)?;
        server = server.with_packager(Arc::new(packager), config.dash.segment_duration_secs);
    }
    let server = Arc::new(server);

    for (name, path) in &register {
        server.register(name, path)?;
    }

    let listener = server.bind().await?;

    let signal = {
        let token = server.cancellation_token();
        tokio::spawn(async move {
            dd_server::shutdown_signal(token.clone()).await;
            token.cancel();
        })
    };

    let publisher = {
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            for (name, path) in publish {
                match server.publish(&path, &name).await {
                    Ok(manifest) => tracing::info!("Published {name} at {}", manifest.display()),
                    Err(e) => tracing::error!("Failed to publish {name} from {:?}: {e}", path),
                }
            }
        })
    };

    let result = server.run(listener).await;

    publisher.abort();
    signal.abort();

    result.map_err(Into::into)
}

fn probe_file(file: &Path, json: bool) -> Result<()> {
    let data = std::fs::read(file).with_context(|| format!("Failed to read file: {:?}", file))?;
    let info = probe::probe_dhav(&data);

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("File: {}", file.display());
    println!("Size: {} bytes ({} parsed)", info.file_size, info.bytes_parsed);
    println!(
        "Frames: {} ({} video, {} key, {} audio, {} other)",
        info.frames, info.video_frames, info.key_frames, info.audio_frames, info.other_frames
    );
    if let (Some(w), Some(h)) = (info.width, info.height) {
        println!("Picture: {w}x{h}");
    }
    if let Some(fps) = info.fps {
        print!("Frame rate: {fps} fps");
        if let Some(gop) = info.gop_interval {
            print!(", GOP {gop}");
        }
        println!();
    }
    if let Some(codec) = info.container_codec {
        println!("Container codec: {codec:?}");
    }
    if let Some(ref codec) = info.detected_codec {
        println!("Detected codec: {codec}");
    }
    if let (Some(first), Some(last)) = (info.first_timestamp, info.last_timestamp) {
        println!("Time: {first} .. {last}");
    }
    if let Some(ref err) = info.error {
        println!("Stopped at: {err}");
    }

    Ok(())
}

fn check_tools(config: &Config) -> Result<()> {
    println!("Checking external tools...\n");

    let tools = ToolRegistry::discover(&config.tools).status();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install GPAC to enable DASH packaging.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let (config, source) = match path {
        Some(p) => (config::load_config(p)?, Some(p.to_path_buf())),
        None => match config::find_default_config() {
            Some(p) => (config::load_config(&p)?, Some(p)),
            None => (Config::default(), None),
        },
    };

    match source {
        Some(p) => println!("✓ Configuration is valid: {:?}", p),
        None => println!("No config file found, using defaults"),
    }
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  DASH output: {}", config.server.output_dir.display());
    println!("  Max connections: {}", config.server.max_connections);
    println!("  Recordings: {}", config.recording.output_dir.display());
    println!("  Codec hint: {:?}", config.recording.codec);
    println!("  Relock policy: {:?}", config.recording.relock_policy);
    println!("  Segment duration: {}s", config.dash.segment_duration_secs);

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!("\nWarnings:");
        for w in warnings {
            println!("  - {w}");
        }
    }

    Ok(())
}
