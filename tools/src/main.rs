//! policy-sampler: batch runner and read-only query tool.
//!
//! Usage:
//!   policy-sampler run --input apps.csv --batch-id MAY2025_RUN1 [--seed 42]
//!   policy-sampler logs
//!   policy-sampler selected --batch-id MAY2025_RUN1 [--csv out.csv]
//!   policy-sampler selected --all [--csv out.csv]
//!   policy-sampler status
//!   policy-sampler serve
//!   policy-sampler generate --records 10000 --flagged-ratio 0.2 --out apps.csv
//!
//! Shared flags: --config sampler.json, --db path (overrides the config).

use anyhow::{bail, Context, Result};
use policy_sampler_core::{
    config::SamplerConfig,
    ingest::RecordValidator,
    query::{export_csv_file, QueryProjection},
    recorder::BatchRecorder,
    rng::SelectionRng,
    store::SelectionEntry,
    synth::SyntheticBatch,
    types::RunStage,
};
use std::env;
use std::io::{self, BufRead, Write};
use std::path::Path;

const DEFAULT_CONFIG_PATH: &str = "sampler.json";

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcQuery {
    Status,
    Logs,
    Selected { batch_id: String },
    SelectedAll,
    Quit,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let Some(command) = args.get(1).map(String::as_str) else {
        bail!("usage: policy-sampler <run|logs|selected|status|serve|generate> [flags]");
    };
    let config = resolve_config(&args)?;

    match command {
        "run" => run_batch(&args, &config),
        "logs" => print_logs(&config),
        "selected" => print_selected(&args, &config),
        "status" => {
            println!("{}", serde_json::to_string_pretty(&QueryProjection::status(&config))?);
            Ok(())
        }
        "serve" => serve(&config),
        "generate" => generate(&args),
        other => bail!("unknown command '{other}'"),
    }
}

fn resolve_config(args: &[String]) -> Result<SamplerConfig> {
    let config = match flag_value(args, "--config") {
        Some(path) => SamplerConfig::load(path)?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => SamplerConfig::load(DEFAULT_CONFIG_PATH)?,
        None => SamplerConfig::default(),
    };
    Ok(match flag_value(args, "--db") {
        Some(db) => config.with_db_path(db),
        None => config,
    })
}

fn run_batch(args: &[String], config: &SamplerConfig) -> Result<()> {
    let input = flag_value(args, "--input").context("--input is required")?;
    let batch_id = flag_value(args, "--batch-id").context("--batch-id is required")?;
    let delimiter = match flag_value(args, "--delimiter") {
        None => None,
        Some("\\t") | Some("tab") => Some(b'\t'),
        Some(d) if d.len() == 1 => Some(d.as_bytes()[0]),
        Some(d) => bail!("delimiter must be a single character, got '{d}'"),
    };
    let mut rng = match flag_value(args, "--seed") {
        Some(seed) => SelectionRng::new(seed.parse().context("--seed must be a u64")?),
        None => SelectionRng::from_entropy(),
    };

    log::info!("batch {batch_id}: input={input} db={} seed={}", config.db_path, rng.seed());
    log::info!(
        "batch {batch_id}: target rate {:.2}%, min count {}",
        config.sampling.target_rate * 100.0,
        config.sampling.min_count
    );

    let mut recorder = BatchRecorder::open(config)?;
    let ingestion = match RecordValidator::today().read_path(Path::new(input), delimiter) {
        Ok(ingestion) => ingestion,
        Err(err) => {
            if let Err(log_err) =
                recorder.record_failure(batch_id, RunStage::Validating, &err, rng.seed())
            {
                log::error!("batch {batch_id}: could not record failure: {log_err}");
            }
            return Err(err.into());
        }
    };
    let log = recorder.run_batch(batch_id, &ingestion, &mut rng)?;

    println!("=== BATCH SUMMARY ===");
    println!("  batch_id:   {}", log.batch_id);
    println!("  submitted:  {}", log.submitted_count);
    println!("  rejected:   {}", log.rejected_count);
    println!("  eligible:   {}", log.eligible_count);
    println!("  pool:       {}", log.pool_type.map(|p| p.as_str()).unwrap_or("-"));
    println!("  selected:   {}", log.selected_count);
    println!("  seed:       {}", log.seed);
    for rejection in &ingestion.rejections {
        println!("  row {:>6}: {}", rejection.row, rejection.reason);
    }
    Ok(())
}

fn print_logs(config: &SamplerConfig) -> Result<()> {
    let projection = QueryProjection::open(config)?;
    for log in projection.logs()? {
        println!(
            "{:>5} | {} | {:<20} | {:<7} | pool {:<7} | {:>5}/{:<6} | {}",
            log.log_id.unwrap_or_default(),
            log.logged_at.format("%Y-%m-%d %H:%M:%S"),
            log.batch_id,
            log.status,
            log.pool_type.map(|p| p.as_str()).unwrap_or("-"),
            log.selected_count,
            log.eligible_count,
            log.message,
        );
    }
    Ok(())
}

fn print_selected(args: &[String], config: &SamplerConfig) -> Result<()> {
    let projection = QueryProjection::open(config)?;
    let entries = if args.iter().any(|a| a == "--all") {
        projection.selected_all()?
    } else {
        let batch_id = flag_value(args, "--batch-id").context("--batch-id or --all is required")?;
        projection.selected_for_batch(batch_id)?
    };

    match flag_value(args, "--csv") {
        Some(out) => {
            let n = export_csv_file(&entries, Path::new(out))?;
            println!("Wrote {n} rows to {out}");
        }
        None => println!("{}", serde_json::to_string_pretty(&entries)?),
    }
    Ok(())
}

/// Answer JSON-lines queries on stdin until EOF or `{"type":"quit"}`.
fn serve(config: &SamplerConfig) -> Result<()> {
    let projection = QueryProjection::open(config)?;
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }

        let query: IpcQuery = match serde_json::from_str(&buffer) {
            Ok(q) => q,
            Err(e) => {
                writeln!(stdout, "{}", serde_json::json!({ "error": e.to_string() }))?;
                stdout.flush()?;
                continue;
            }
        };

        if matches!(query, IpcQuery::Quit) {
            break;
        }
        let response = reply(&projection, config, query);
        writeln!(stdout, "{response}")?;
        stdout.flush()?;
    }
    Ok(())
}

/// A failed query answers with an error object; the loop keeps serving.
fn reply(projection: &QueryProjection, config: &SamplerConfig, query: IpcQuery) -> serde_json::Value {
    answer(projection, config, query).unwrap_or_else(|e| {
        log::warn!("serve: query failed: {e:#}");
        serde_json::json!({ "error": format!("{e:#}") })
    })
}

fn answer(
    projection: &QueryProjection,
    config: &SamplerConfig,
    query: IpcQuery,
) -> Result<serde_json::Value> {
    Ok(match query {
        IpcQuery::Quit => serde_json::Value::Null,
        IpcQuery::Status => serde_json::to_value(QueryProjection::status(config))?,
        IpcQuery::Logs => serde_json::to_value(projection.logs()?)?,
        IpcQuery::Selected { batch_id } => {
            not_found_if_empty(projection.selected_for_batch(&batch_id)?, &batch_id)?
        }
        IpcQuery::SelectedAll => not_found_if_empty(projection.selected_all()?, "any batch")?,
    })
}

fn not_found_if_empty(entries: Vec<SelectionEntry>, scope: &str) -> Result<serde_json::Value> {
    if entries.is_empty() {
        return Ok(serde_json::json!({ "error": format!("no selected applications for {scope}") }));
    }
    Ok(serde_json::to_value(entries)?)
}

fn generate(args: &[String]) -> Result<()> {
    let out = flag_value(args, "--out").unwrap_or("input_applications.csv");
    let batch = SyntheticBatch {
        records:       parse_arg(args, "--records", 10_000usize),
        flagged_ratio: parse_arg(args, "--flagged-ratio", 0.20f64),
        end_date:      chrono::Utc::now().date_naive(),
    };
    let mut rng = SelectionRng::new(parse_arg(args, "--seed", 42u64));
    let file = std::fs::File::create(out).with_context(|| format!("cannot create {out}"))?;
    let n = batch.write_csv(&mut rng, file)?;
    println!("Generated {n} records into {out}");
    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
