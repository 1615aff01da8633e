use std::fs;
use std::sync::Barrier;
use std::thread;
use std::time::Instant;

use anyhow::{bail, Context};
use colored::Colorize;
use riviere_collector::{Collector, CollectorConfig};
use riviere_log::{LogBuffer, LogConfig};
use serde::Serialize;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Stress(args) => cmd_stress(args, cli.format),
        Command::Order(args) => cmd_order(args, cli.format),
        Command::Log(args) => cmd_log(args, cli.format),
    }
}

/// Resolve the collector configuration: file first, then flag overrides.
pub fn load_collector_config(args: &CollectorArgs) -> anyhow::Result<CollectorConfig> {
    let mut config: CollectorConfig = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => CollectorConfig::default(),
    };
    if let Some(capacity) = args.initial_capacity {
        config.initial_capacity = capacity;
    }
    config.validate()?;
    Ok(config)
}

#[derive(Debug, Serialize)]
struct StressReport {
    threads: usize,
    per_thread: usize,
    initial_capacity: usize,
    elements: usize,
    segments: usize,
    elapsed_ms: f64,
    adds_per_sec: f64,
}

fn cmd_stress(args: StressArgs, format: OutputFormat) -> anyhow::Result<()> {
    if args.threads == 0 {
        bail!("--threads must be at least 1");
    }
    let Some(expected) = args.threads.checked_mul(args.per_thread) else {
        bail!(
            "{} threads x {} adds overflows the element count",
            args.threads,
            args.per_thread
        );
    };
    let config = load_collector_config(&args.collector)?;
    let collector = Collector::with_config(&config)?;
    let barrier = Barrier::new(args.threads);

    let started = Instant::now();
    thread::scope(|s| -> anyhow::Result<()> {
        let handles: Vec<_> = (0..args.threads)
            .map(|t| {
                let collector = &collector;
                let barrier = &barrier;
                s.spawn(move || -> riviere_collector::Result<()> {
                    barrier.wait();
                    for i in 0..args.per_thread {
                        collector.add((t, i))?;
                    }
                    Ok(())
                })
            })
            .collect();
        for handle in handles {
            match handle.join() {
                Ok(result) => result?,
                Err(_) => bail!("producer thread panicked"),
            }
        }
        Ok(())
    })?;
    let elapsed = started.elapsed();

    let sequence = collector.build()?;
    let segments = sequence.segment_count();
    if sequence.estimate_size() != expected {
        bail!(
            "size mismatch: expected {expected}, sequence reports {}",
            sequence.estimate_size()
        );
    }

    // Each producer added sequentially, so its own values must ascend.
    let mut last: Vec<Option<usize>> = vec![None; args.threads];
    let mut elements = 0;
    for &(t, i) in sequence {
        if let Some(prev) = last[t] {
            if i <= prev {
                bail!("thread {t} out of order: {i} after {prev}");
            }
        }
        last[t] = Some(i);
        elements += 1;
    }
    if elements != expected {
        bail!("lost elements: expected {expected}, traversed {elements}");
    }

    let secs = elapsed.as_secs_f64();
    let report = StressReport {
        threads: args.threads,
        per_thread: args.per_thread,
        initial_capacity: config.initial_capacity,
        elements,
        segments,
        elapsed_ms: secs * 1000.0,
        adds_per_sec: if secs > 0.0 { elements as f64 / secs } else { 0.0 },
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!(
                "{} {} elements from {} threads",
                "✓".green().bold(),
                report.elements.to_string().bold(),
                report.threads
            );
            println!("  Segments: {}", report.segments.to_string().cyan());
            println!("  Elapsed: {:.2} ms", report.elapsed_ms);
            println!("  Throughput: {} adds/s", format!("{:.0}", report.adds_per_sec).yellow());
        }
    }
    Ok(())
}

fn cmd_order(args: OrderArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_collector_config(&args.collector)?;
    let collector = Collector::with_config(&config)?;

    thread::scope(|s| -> anyhow::Result<()> {
        for batch in [["x1", "x2"], ["y1", "y2"]] {
            let collector = &collector;
            s.spawn(move || collector.add_all(batch).map(|_| ()))
                .join()
                .map_err(|_| anyhow::anyhow!("producer thread panicked"))??;
        }
        Ok(())
    })?;

    let elements: Vec<&str> = collector.build()?.copied().collect();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&elements)?),
        OutputFormat::Text => {
            println!("{} [{}]", "Sequence:".bold(), elements.join(", ").cyan());
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct LogReport {
    output: String,
    written: usize,
}

fn cmd_log(args: LogArgs, format: OutputFormat) -> anyhow::Result<()> {
    let collector = load_collector_config(&args.collector)?;
    let config = LogConfig::new(&args.output)
        .with_append(args.append)
        .with_collector(collector);
    let buffer = LogBuffer::new(config)?;

    thread::scope(|s| -> anyhow::Result<()> {
        let handles: Vec<_> = (0..args.threads)
            .map(|t| {
                let buffer = &buffer;
                s.spawn(move || -> riviere_log::Result<()> {
                    for i in 0..args.messages {
                        buffer.log(format!("worker {t}: message {i}"))?;
                    }
                    Ok(())
                })
            })
            .collect();
        for handle in handles {
            match handle.join() {
                Ok(result) => result?,
                Err(_) => bail!("logger thread panicked"),
            }
        }
        Ok(())
    })?;

    let written = buffer.flush()?;
    let report = LogReport {
        output: buffer.output().display().to_string(),
        written,
    };
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => println!(
            "{} Wrote {} lines to {}",
            "✓".green().bold(),
            report.written.to_string().bold(),
            report.output
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_file_then_flag_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collector.toml");
        fs::write(&path, "initial_capacity = 32\n").unwrap();

        let from_file = load_collector_config(&CollectorArgs {
            config: Some(path.clone()),
            initial_capacity: None,
        })
        .unwrap();
        assert_eq!(from_file.initial_capacity, 32);

        let overridden = load_collector_config(&CollectorArgs {
            config: Some(path),
            initial_capacity: Some(4),
        })
        .unwrap();
        assert_eq!(overridden.initial_capacity, 4);
    }

    #[test]
    fn defaults_without_file() {
        let config = load_collector_config(&CollectorArgs::default()).unwrap();
        assert_eq!(config, CollectorConfig::default());
    }

    #[test]
    fn zero_capacity_flag_is_rejected() {
        let err = load_collector_config(&CollectorArgs {
            config: None,
            initial_capacity: Some(0),
        });
        assert!(err.is_err());
    }

    #[test]
    fn stress_small_run_succeeds() {
        let args = StressArgs {
            threads: 4,
            per_thread: 500,
            collector: CollectorArgs {
                config: None,
                initial_capacity: Some(1),
            },
        };
        cmd_stress(args, OutputFormat::Json).unwrap();
    }

    #[test]
    fn stress_rejects_overflowing_element_count() {
        let args = StressArgs {
            threads: 2,
            per_thread: usize::MAX,
            collector: CollectorArgs::default(),
        };
        let err = cmd_stress(args, OutputFormat::Text).unwrap_err();
        assert!(err.to_string().contains("overflows"), "{err}");
    }

    #[test]
    fn log_command_writes_every_line() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("cli.log");
        let args = LogArgs {
            output: output.clone(),
            threads: 3,
            messages: 10,
            append: false,
            collector: CollectorArgs::default(),
        };
        cmd_log(args, OutputFormat::Text).unwrap();
        assert_eq!(fs::read_to_string(output).unwrap().lines().count(), 30);
    }
}
