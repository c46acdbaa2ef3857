//! Capture session driven from the console
//!
//! Spawns the pipeline against the simulated bus, restores saved filters,
//! comments and jobs, connects, and records admitted traffic until the run
//! time elapses, the operator interrupts, or the driver fails.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use can_frame::display::hex_bytes;
use can_pipeline::{
    DisconnectReason, GroupedStat, PipelineEvent, PipelineHandle, PipelineStatus,
};
use can_sim::VirtualBus;
use tracing::{error, info, warn};

use crate::settings::Settings;
use crate::traffic_log::{LogEntry, TrafficLog};

/// How to run a capture
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Channel to open
    pub channel: u8,
    /// How long to capture
    pub duration: Duration,
    /// Print each admitted frame as it arrives
    pub echo: bool,
}

/// What a capture produced
#[derive(Debug)]
pub struct RunReport {
    /// Admitted traffic
    pub log: TrafficLog,
    /// Per-identifier statistics at the end of the run
    pub stats: Vec<GroupedStat>,
    /// Pipeline status at the end of the run
    pub status: PipelineStatus,
    /// Events lost because the console fell behind
    pub dropped: u64,
}

/// Push saved filters, comments and jobs into the pipeline
async fn apply_settings(pipeline: &PipelineHandle, settings: &Settings) -> anyhow::Result<()> {
    for saved in &settings.filters {
        let filter = saved
            .to_filter()
            .with_context(|| format!("invalid saved filter '{}'", saved.name))?;
        pipeline.add_filter(filter).await?;
    }

    for (id, text) in &settings.comments {
        pipeline.set_comment(*id, text.clone()).await?;
    }

    for job in &settings.jobs {
        pipeline
            .add_job(job.clone())
            .await
            .with_context(|| format!("invalid saved job for {}", job.template.id()))?;
    }

    Ok(())
}

/// Run one capture
pub async fn run(settings: &Settings, options: &RunOptions) -> anyhow::Result<RunReport> {
    let bus = VirtualBus::new(settings.simulation.clone()).context("invalid simulation")?;
    let pipeline = PipelineHandle::spawn(Arc::new(bus), settings.pipeline.clone());
    let mut feed = pipeline.subscribe();

    apply_settings(&pipeline, settings).await?;
    pipeline
        .connect(options.channel, settings.bus)
        .await
        .with_context(|| format!("could not connect to channel {}", options.channel))?;

    let started = pipeline.start_all().await?;
    info!(
        "Capturing on channel {} for {:?} ({} periodic job(s))",
        options.channel,
        options.duration,
        started.len()
    );

    let mut log = TrafficLog::new(settings.traffic_history_size);
    let deadline = tokio::time::sleep(options.duration);
    tokio::pin!(deadline);
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            _ = &mut deadline => break,

            _ = &mut interrupt => {
                info!("Interrupted");
                break;
            }

            event = feed.recv() => match event {
                Some(PipelineEvent::FrameAdmitted { frame, category, comment }) => {
                    let entry = LogEntry { frame, category, comment };
                    if options.echo {
                        println!("{}", TrafficLog::format_entry(&entry).trim_end());
                    }
                    log.push(entry);
                }
                Some(PipelineEvent::Error(message)) => warn!("{}", message),
                Some(PipelineEvent::SessionDisconnected {
                    channel,
                    reason: DisconnectReason::DriverFault(e),
                }) => {
                    error!("Channel {} lost: {}", channel, e);
                    break;
                }
                Some(_) => {}
                None => break,
            },
        }
    }

    pipeline.stop_all().await?;
    let status = pipeline.status().await?;
    let stats = pipeline.stats_snapshot();
    if status.channel.is_some() {
        pipeline.disconnect().await?;
    }
    pipeline.shutdown().await?;

    Ok(RunReport {
        log,
        stats,
        status,
        dropped: feed.dropped(),
    })
}

/// Grouped statistics as a text table
pub fn format_stats(stats: &[GroupedStat]) -> String {
    let mut output = format!("{:<10} {:>8}  {:<23}  {}\n", "ID", "Count", "Last Data", "Last Time");
    for stat in stats {
        let us = stat.last_time.as_micros();
        output.push_str(&format!(
            "{:<10} {:>8}  {:<23}  {}.{:06}\n",
            stat.id.to_string(),
            stat.count,
            hex_bytes(&stat.last_data),
            us / 1_000_000,
            us % 1_000_000
        ));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use can_frame::{CanId, FrameFlags, FrameTemplate, Timestamp};
    use can_pipeline::{Category, FilterKind, FilterPolicy, JobConfig};
    use can_sim::{PayloadPattern, SimNodeConfig, VirtualBusConfig};

    use crate::settings::FilterSettings;

    fn template(id: u32, data: &[u8]) -> FrameTemplate {
        FrameTemplate::new(CanId::standard(id).unwrap(), data.to_vec(), FrameFlags::CLASSIC)
            .unwrap()
    }

    fn settings() -> Settings {
        Settings {
            simulation: VirtualBusConfig {
                loopback: false,
                nodes: vec![
                    SimNodeConfig {
                        name: "engine".into(),
                        template: template(0x0C0, &[0, 1]),
                        period_ms: 10,
                        pattern: PayloadPattern::Counter { index: 0 },
                    },
                    SimNodeConfig {
                        name: "body".into(),
                        template: template(0x3E0, &[1]),
                        period_ms: 10,
                        pattern: PayloadPattern::Fixed,
                    },
                ],
            },
            jobs: vec![JobConfig::new(template(0x5A0, &[0x02, 0x01, 0x0C]), 20, Some(3)).unwrap()],
            filters: vec![FilterSettings {
                name: "hide-body".into(),
                kind: FilterKind::Single { id: 0x3E0 },
                policy: FilterPolicy::Reject,
                enabled: true,
            }],
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn test_run_records_admitted_traffic() {
        let options = RunOptions {
            channel: 2,
            duration: Duration::from_millis(400),
            echo: false,
        };
        let report = run(&settings(), &options).await.unwrap();

        // Filtered out of the log, still counted
        assert!(report.log.entries().all(|e| e.frame.id().raw() != 0x3E0));
        assert!(report.stats.iter().any(|s| s.id.raw() == 0x3E0));

        assert!(report.log.entries().any(|e| e.frame.id().raw() == 0x0C0));
        let sent: Vec<_> = report
            .log
            .entries()
            .filter(|e| e.category == Category::Tx)
            .collect();
        assert_eq!(sent.len(), 3);
        assert_eq!(report.status.counters.tx, 3);
        assert_eq!(report.status.channel, Some(2));
    }

    #[tokio::test]
    async fn test_run_rejects_bad_channel() {
        let options = RunOptions {
            channel: 9,
            duration: Duration::from_millis(10),
            echo: false,
        };
        assert!(run(&settings(), &options).await.is_err());
    }

    #[test]
    fn test_stats_table() {
        let stats = vec![GroupedStat {
            id: CanId::standard(0x744).unwrap(),
            count: 3,
            last_data: vec![0xB],
            last_time: Timestamp::from_micros(2_000_001),
        }];
        let table = format_stats(&stats);
        let row = table.lines().nth(1).unwrap();
        assert!(row.starts_with("0x744"));
        assert!(row.contains(" 3 "));
        assert!(row.contains("0B"));
        assert!(row.ends_with("2.000001"));
    }
}
