//! The `tts` consumer: synthesize each event concurrently, play clips one at
//! a time through a bounded queue.

use std::sync::{Arc, RwLock};

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    danmu_common::{Envelope, EventKind, FormattedEnvelope},
    danmu_plugins::{
        BoundedQueue, Capability, ConfigField, Consumer, Plugin, PluginConfig, PluginDescriptor,
        PluginRegistry, queue::DEFAULT_CAPACITY,
    },
    tokio_util::{sync::CancellationToken, task::TaskTracker},
    tracing::{debug, info, warn},
};

use crate::{
    player::{CommandPlayer, Player, PlayerKind},
    synth::{AudioClip, Backend, CommandSynthesizer, Synthesizer},
};

pub const NAME: &str = "tts";
const DEFAULT_VOICE: &str = "zh-CN-XiaoxiaoNeural";

/// Sentence spoken for a formatted event.
pub fn speech_text(formatted: &FormattedEnvelope) -> String {
    match formatted.kind {
        EventKind::Chat => format!("{}说：{}", formatted.user_name, formatted.content),
        EventKind::EndLive => formatted.content.clone(),
        _ => format!("{}{}", formatted.user_name, formatted.content),
    }
}

enum Backends {
    FromConfig,
    Fixed {
        synth: Arc<dyn Synthesizer>,
        player: Arc<dyn Player>,
    },
}

struct Active {
    synth: Arc<dyn Synthesizer>,
    queue: Arc<BoundedQueue<AudioClip>>,
    player: Arc<dyn Player>,
}

pub struct SpeechConsumer {
    backends: Backends,
    active: RwLock<Option<Arc<Active>>>,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

impl Default for SpeechConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechConsumer {
    /// Backends are chosen from the `backend`, `voice` and `player` fields
    /// at init.
    pub fn new() -> Self {
        Self::build(Backends::FromConfig)
    }

    /// Use the given backends; only `queue_size` is read from config.
    pub fn with_backends(synth: Arc<dyn Synthesizer>, player: Arc<dyn Player>) -> Self {
        Self::build(Backends::Fixed { synth, player })
    }

    fn build(backends: Backends) -> Self {
        Self {
            backends,
            active: RwLock::new(None),
            tasks: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    fn active(&self) -> Option<Arc<Active>> {
        self.active.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Clips waiting for the player.
    pub fn queued(&self) -> usize {
        self.active().map_or(0, |a| a.queue.len())
    }

    /// Clips discarded because the playback queue was full.
    pub fn dropped(&self) -> u64 {
        self.active().map_or(0, |a| a.queue.dropped())
    }

    fn resolve_backends(&self, config: &PluginConfig) -> Result<(Arc<dyn Synthesizer>, Arc<dyn Player>)> {
        if let Backends::Fixed { synth, player } = &self.backends {
            return Ok((Arc::clone(synth), Arc::clone(player)));
        }
        let backend: Backend = config.choice("backend")?.parse()?;
        let synth = CommandSynthesizer::new(backend, config.str("voice")?);
        synth.check()?;
        let player = CommandPlayer::detect(config.choice("player")?.parse::<PlayerKind>()?)?;
        info!(backend = %backend, player = %player.kind(), "speech backends ready");
        Ok((Arc::new(synth), Arc::new(player)))
    }
}

#[async_trait]
impl Plugin for SpeechConsumer {
    fn name(&self) -> &str {
        NAME
    }

    fn capability(&self) -> Capability {
        Capability::Consumer
    }

    async fn init(&self, config: PluginConfig) -> Result<()> {
        let capacity = config.usize("queue_size")?;
        let (synth, player) = self.resolve_backends(&config)?;
        let queue = Arc::new(BoundedQueue::new("tts_playback", capacity));
        *self.active.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(Active {
            synth,
            queue,
            player,
        }));
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        let active = self.active().context("tts consumer started before init")?;
        let player = Arc::clone(&active.player);
        active.queue.start(move |clip: AudioClip| {
            let player = Arc::clone(&player);
            async move {
                if let Err(e) = player.play(&clip).await {
                    warn!(error = %e, "audio playback failed");
                }
            }
        });
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.cancel.cancel();
        self.tasks.close();
        if let Some(active) = self.active() {
            active.queue.shutdown().await;
        }
        self.tasks.wait().await;
        debug!("tts consumer stopped");
        Ok(())
    }

    fn as_consumer(self: Arc<Self>) -> Option<Arc<dyn Consumer>> {
        Some(self)
    }
}

#[async_trait]
impl Consumer for SpeechConsumer {
    /// Start synthesis in the background and return immediately.
    async fn consume(&self, envelope: Arc<Envelope>) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        let Some(formatted) = &envelope.formatted else {
            return Ok(());
        };
        let active = self.active().context("tts consumer used before init")?;
        let text = speech_text(formatted);
        let cancel = self.cancel.clone();

        self.tasks.spawn(async move {
            let clip = tokio::select! {
                _ = cancel.cancelled() => return,
                clip = active.synth.synthesize(&text) => clip,
            };
            match clip {
                Ok(clip) => {
                    active.queue.push(clip);
                },
                Err(e) => warn!(backend = active.synth.id(), error = %e, "speech synthesis failed"),
            }
        });
        Ok(())
    }
}

pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::new(NAME, Capability::Consumer)
        .with_description("Read events aloud")
        .field(ConfigField::string(
            "voice",
            DEFAULT_VOICE,
            "edge-tts voice name, or piper model path",
        ))
        .field(ConfigField::choice(
            "backend",
            Backend::NAMES,
            "edge-tts",
            "Speech synthesis backend",
        ))
        .field(ConfigField::choice(
            "player",
            PlayerKind::NAMES,
            "auto",
            "Audio player",
        ))
        .field(ConfigField::number(
            "queue_size",
            DEFAULT_CAPACITY as f64,
            "Clips waiting for playback before new ones are dropped",
        ))
}

pub fn register(registry: &PluginRegistry) -> danmu_plugins::Result<()> {
    registry.register(descriptor(), || Arc::new(SpeechConsumer::new()))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::synth::AudioFormat,
        bytes::Bytes,
        danmu_common::{ChatData, Payload},
        serde_json::{Map, json},
        std::{
            sync::{
                Mutex,
                atomic::{AtomicUsize, Ordering},
            },
            time::Duration,
        },
    };

    #[derive(Default)]
    struct EchoSynth {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Synthesizer for EchoSynth {
        fn id(&self) -> &'static str {
            "echo"
        }

        async fn synthesize(&self, text: &str) -> Result<AudioClip> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AudioClip {
                data: Bytes::from(text.to_string()),
                format: AudioFormat::Mp3,
            })
        }
    }

    #[derive(Default)]
    struct Speaker {
        block: bool,
        started: AtomicUsize,
        played: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Player for Speaker {
        async fn play(&self, clip: &AudioClip) -> Result<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            if self.block {
                std::future::pending::<()>().await;
            }
            let text = String::from_utf8(clip.data.to_vec()).unwrap();
            self.played.lock().unwrap().push(text);
            Ok(())
        }
    }

    fn chat(user: &str, content: &str) -> Arc<Envelope> {
        let envelope = Envelope::new("1", "bilibili", Payload::Chat(ChatData::default()));
        let formatted = FormattedEnvelope::new(EventKind::Chat, user, "bilibili", "", content);
        Arc::new(envelope.with_formatted(formatted))
    }

    async fn started(synth: &Arc<EchoSynth>, player: &Arc<Speaker>, queue_size: u64) -> SpeechConsumer {
        let consumer = SpeechConsumer::with_backends(
            Arc::clone(synth) as Arc<dyn Synthesizer>,
            Arc::clone(player) as Arc<dyn Player>,
        );
        let mut raw = Map::new();
        raw.insert("queue_size".into(), json!(queue_size));
        consumer.init(descriptor().resolve(&raw).unwrap()).await.unwrap();
        consumer.start().await.unwrap();
        consumer
    }

    async fn eventually(check: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[test]
    fn speech_text_per_kind() {
        let chat = FormattedEnvelope::new(EventKind::Chat, "alice", "bilibili", "", "hello");
        assert_eq!(speech_text(&chat), "alice说：hello");
        let gift = FormattedEnvelope::new(EventKind::Gift, "bob", "bilibili", "", "送出了 1 个 花 (1.00 元)");
        assert_eq!(speech_text(&gift), "bob送出了 1 个 花 (1.00 元)");
        let end = FormattedEnvelope::new(EventKind::EndLive, "", "bilibili", "", "直播结束");
        assert_eq!(speech_text(&end), "直播结束");
    }

    #[tokio::test]
    async fn speaks_every_event() {
        let synth = Arc::new(EchoSynth::default());
        let player = Arc::new(Speaker::default());
        let consumer = started(&synth, &player, 10).await;

        for content in ["a", "b", "c"] {
            consumer.consume(chat("u", content)).await.unwrap();
        }
        eventually(|| player.played.lock().unwrap().len() == 3).await;
        let mut played = player.played.lock().unwrap().clone();
        played.sort();
        assert_eq!(played, ["u说：a", "u说：b", "u说：c"]);
        consumer.stop().await.unwrap();
    }

    #[tokio::test]
    async fn full_queue_drops_and_stop_interrupts_playback() {
        let synth = Arc::new(EchoSynth::default());
        let player = Arc::new(Speaker {
            block: true,
            ..Default::default()
        });
        let consumer = started(&synth, &player, 2).await;

        // The first clip occupies the player; of the next five, two fit.
        consumer.consume(chat("u", "0")).await.unwrap();
        eventually(|| player.started.load(Ordering::SeqCst) == 1).await;
        for i in 1..6 {
            consumer.consume(chat("u", &i.to_string())).await.unwrap();
        }
        eventually(|| synth.calls.load(Ordering::SeqCst) == 6).await;
        eventually(|| consumer.dropped() == 3).await;

        assert_eq!(consumer.dropped(), 3);
        assert_eq!(consumer.queued(), 2);

        tokio::time::timeout(Duration::from_secs(2), consumer.stop())
            .await
            .expect("stop blocked on the player")
            .unwrap();
        assert!(player.played.lock().unwrap().is_empty());
        assert_eq!(player.started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ignores_unformatted_and_post_stop_events() {
        let synth = Arc::new(EchoSynth::default());
        let player = Arc::new(Speaker::default());
        let consumer = started(&synth, &player, 10).await;

        let bare = Arc::new(Envelope::new("1", "bilibili", Payload::Chat(ChatData::default())));
        consumer.consume(bare).await.unwrap();
        consumer.stop().await.unwrap();
        consumer.consume(chat("u", "late")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(synth.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn descriptor_defaults() {
        let defaults = descriptor().defaults();
        assert_eq!(defaults["voice"], json!(DEFAULT_VOICE));
        assert_eq!(defaults["backend"], json!("edge-tts"));
        assert_eq!(defaults["player"], json!("auto"));
        assert_eq!(defaults["queue_size"], json!(100.0));
    }
}
