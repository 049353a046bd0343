//! 音频引用解析
//!
//! Tracks which segments have a playable URL. Resolution is asynchronous and
//! owned by the host: the registry hands out tickets tagged with a generation,
//! the host sends the outcome back through a channel, and `poll` drops any
//! answer whose generation is no longer current (segment deleted, split, or
//! its audio reference replaced in the meantime).

use crate::model::SegmentModel;
use crate::structure::SegmentId;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq)]
pub enum AudioStatus {
    Pending,
    Ready(String),
    Failed(String),
}

/// One outstanding resolution request.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioTicket {
    pub segment_id: SegmentId,
    pub audio_ref: String,
    pub generation: u64,
}

/// Host reply for a ticket: the playable URL, or why there is none.
#[derive(Clone, Debug)]
pub struct AudioResolution {
    pub ticket: AudioTicket,
    pub result: Result<String, String>,
}

#[derive(Clone, Debug)]
struct AudioEntry {
    audio_ref: String,
    generation: u64,
    status: AudioStatus,
}

pub struct AudioRegistry {
    entries: HashMap<SegmentId, AudioEntry>,
    next_generation: u64,
    sender: Sender<AudioResolution>,
    receiver: Receiver<AudioResolution>,
}

impl Default for AudioRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioRegistry {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            entries: HashMap::new(),
            next_generation: 1,
            sender,
            receiver,
        }
    }

    /// Channel end the host resolver replies on.
    pub fn completion_sender(&self) -> Sender<AudioResolution> {
        self.sender.clone()
    }

    fn bump(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }

    /// Reconciles with the model: forgets segments that are gone or lost their
    /// reference, and issues a ticket for every new or changed reference.
    pub fn sync(&mut self, model: &SegmentModel) -> Vec<AudioTicket> {
        self.entries.retain(|id, entry| {
            model
                .segment(id)
                .and_then(|s| s.audio_ref.as_deref())
                .map_or(false, |r| r == entry.audio_ref)
        });

        let wanted: Vec<(SegmentId, String)> = model
            .segments()
            .filter_map(|s| s.audio_ref.clone().map(|r| (s.id.clone(), r)))
            .filter(|(id, _)| !self.entries.contains_key(id))
            .collect();

        let mut tickets = Vec::with_capacity(wanted.len());
        for (segment_id, audio_ref) in wanted {
            let generation = self.bump();
            self.entries.insert(
                segment_id.clone(),
                AudioEntry {
                    audio_ref: audio_ref.clone(),
                    generation,
                    status: AudioStatus::Pending,
                },
            );
            tickets.push(AudioTicket {
                segment_id,
                audio_ref,
                generation,
            });
        }
        tickets
    }

    /// Applies a reply if it is still current. Returns whether it was applied.
    pub fn complete(&mut self, resolution: AudioResolution) -> bool {
        let ticket = &resolution.ticket;
        let Some(entry) = self.entries.get_mut(&ticket.segment_id) else {
            log::debug!("Dropping audio result for removed segment {}", ticket.segment_id);
            return false;
        };
        if entry.generation != ticket.generation {
            log::debug!(
                "Dropping stale audio result for {} (gen {} != {})",
                ticket.segment_id,
                ticket.generation,
                entry.generation
            );
            return false;
        }
        entry.status = match resolution.result {
            Ok(url) => AudioStatus::Ready(url),
            Err(reason) => {
                log::warn!("Audio for {} unavailable: {}", ticket.segment_id, reason);
                AudioStatus::Failed(reason)
            }
        };
        true
    }

    /// Drains the completion channel. Returns how many replies were applied.
    pub fn poll(&mut self) -> usize {
        let pending: Vec<AudioResolution> = self.receiver.try_iter().collect();
        pending.into_iter().filter(|r| self.complete(r.clone())).count()
    }

    /// Records a URL that arrived already resolved (audio-ready notification).
    /// The segment's `audio_ref` must equal `url` for the entry to survive
    /// the next `sync`.
    pub fn mark_ready(&mut self, segment_id: &SegmentId, url: &str) {
        let generation = self.bump();
        self.entries.insert(
            segment_id.clone(),
            AudioEntry {
                audio_ref: url.to_string(),
                generation,
                status: AudioStatus::Ready(url.to_string()),
            },
        );
    }

    pub fn status(&self, segment_id: &SegmentId) -> Option<&AudioStatus> {
        self.entries.get(segment_id).map(|e| &e.status)
    }

    /// Playable URL, if resolved.
    pub fn url(&self, segment_id: &SegmentId) -> Option<&str> {
        match self.entries.get(segment_id).map(|e| &e.status) {
            Some(AudioStatus::Ready(url)) => Some(url.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SegmentPatch;
    use crate::structure::SeedSegment;

    fn model() -> SegmentModel {
        let seed = |id: &str, start: f64, end: f64, audio: Option<&str>| SeedSegment {
            id: id.into(),
            speaker: "A".into(),
            start,
            end,
            source_text: String::new(),
            target_text: String::new(),
            audio_ref: audio.map(str::to_string),
            playback_rate: None,
        };
        SegmentModel::from_seed(
            vec![seed("a", 0.0, 1.0, Some("ref-a")), seed("b", 2.0, 3.0, None)],
            10.0,
            0.05,
        )
        .unwrap()
    }

    #[test]
    fn tickets_only_for_segments_with_references() {
        let model = model();
        let mut registry = AudioRegistry::new();
        let tickets = registry.sync(&model);
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].audio_ref, "ref-a");
        assert!(registry.sync(&model).is_empty());
        assert_eq!(registry.status(&"a".into()), Some(&AudioStatus::Pending));
    }

    #[test]
    fn replies_arrive_through_channel() {
        let model = model();
        let mut registry = AudioRegistry::new();
        let ticket = registry.sync(&model).remove(0);
        registry
            .completion_sender()
            .send(AudioResolution {
                ticket,
                result: Ok("file:///a.wav".into()),
            })
            .unwrap();
        assert_eq!(registry.poll(), 1);
        assert_eq!(registry.url(&"a".into()), Some("file:///a.wav"));
    }

    #[test]
    fn stale_reply_is_discarded() {
        let mut model = model();
        let mut registry = AudioRegistry::new();
        let old_ticket = registry.sync(&model).remove(0);

        let patch = SegmentPatch {
            audio_ref: Some(Some("ref-a-v2".into())),
            ..Default::default()
        };
        model.update_segment(&"a".into(), patch).unwrap();
        let new_ticket = registry.sync(&model).remove(0);
        assert!(new_ticket.generation > old_ticket.generation);

        assert!(!registry.complete(AudioResolution {
            ticket: old_ticket,
            result: Ok("old.wav".into()),
        }));
        assert_eq!(registry.url(&"a".into()), None);
        assert!(registry.complete(AudioResolution {
            ticket: new_ticket,
            result: Ok("new.wav".into()),
        }));
        assert_eq!(registry.url(&"a".into()), Some("new.wav"));
    }

    #[test]
    fn failures_are_recorded_not_fatal() {
        let model = model();
        let mut registry = AudioRegistry::new();
        let ticket = registry.sync(&model).remove(0);
        registry.complete(AudioResolution {
            ticket,
            result: Err("404".into()),
        });
        assert_eq!(registry.url(&"a".into()), None);
        assert!(matches!(registry.status(&"a".into()), Some(AudioStatus::Failed(_))));
    }
}
