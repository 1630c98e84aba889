//! Spoken event announcements: local speech synthesis backends, audio
//! players, and the `tts` consumer that ties them to a playback queue.

pub mod consumer;
pub mod player;
pub mod synth;

pub use {
    consumer::{SpeechConsumer, register, speech_text},
    player::{CommandPlayer, Player, PlayerKind},
    synth::{AudioClip, AudioFormat, Backend, CommandSynthesizer, Synthesizer},
};
