use crossbeam_channel::{select, Receiver, Sender};
use std::collections::HashSet;
use std::time::Duration;

use crate::cluster::{Change, ClusterId, ParamExtractor, TemplateMiner};
use crate::event::{ProcessedEvent, RawEvent, Severity};
use crate::notify::Notifier;
use crate::shutdown::Shutdown;

const ALERT_TITLE: &str = "SYSTEM ERROR";
const PREVIEW_CHARS: usize = 100;

#[derive(Debug, PartialEq)]
pub struct Normalized {
    pub cluster_id: ClusterId,
    /// Whether the line was echoed to the operator.
    pub surfaced: bool,
    pub event: ProcessedEvent,
}

/// Turns raw events into template/parameter pairs.
pub struct Normalizer {
    miner: TemplateMiner,
    extractor: ParamExtractor,
    shown: HashSet<ClusterId>,
    notifier: Box<dyn Notifier>,
}

impl Normalizer {
    #[must_use]
    pub fn new(similarity_threshold: f64, notifier: Box<dyn Notifier>) -> Self {
        Self {
            miner: TemplateMiner::new(similarity_threshold),
            extractor: ParamExtractor::new(),
            shown: HashSet::new(),
            notifier,
        }
    }

    pub fn process(&mut self, raw: &RawEvent) -> Normalized {
        let mined = self.miner.add(&raw.message);
        let params = self.extractor.extract(&mined.template, &raw.message);
        let severity = Severity::from_priority(raw.priority);

        let first_sighting = !self.shown.contains(&mined.cluster_id);
        let surfaced = first_sighting || severity.always_shown();
        if surfaced {
            self.shown.insert(mined.cluster_id);
            if first_sighting {
                log::info!("new template #{}: {}", mined.cluster_id, mined.template);
            } else if mined.change == Change::Generalized {
                log::debug!("template #{} is now: {}", mined.cluster_id, mined.template);
            }
            let preview = raw.message.chars().take(PREVIEW_CHARS).collect::<String>();
            log::log!(
                severity.log_level(),
                "[{:<5}] {}: {}",
                severity.label(),
                raw.unit,
                preview
            );
            if severity.raises_alert() {
                self.notifier
                    .notify(ALERT_TITLE, &format!("{}: {}", raw.unit, raw.message));
            }
        }

        Normalized {
            cluster_id: mined.cluster_id,
            surfaced,
            event: ProcessedEvent {
                template: mined.template,
                params,
                priority: raw.priority,
                original: raw.message.clone(),
                unit: raw.unit.clone(),
            },
        }
    }

    /// Mines events from `input` until shutdown or until either channel
    /// closes.
    pub fn run(
        mut self,
        input: &Receiver<RawEvent>,
        output: &Sender<ProcessedEvent>,
        shutdown: &Shutdown,
        poll: Duration,
    ) {
        log::info!("normalizer started");
        loop {
            select! {
                recv(input) -> msg => match msg {
                    Ok(raw) => {
                        let normalized = self.process(&raw);
                        if output.send(normalized.event).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                recv(shutdown.receiver()) -> _ => break,
                default(poll) => {}
            }
        }
        log::info!("normalizer stopped after mining {} templates", self.miner.len());
    }
}
