//! # Tonality Diamond: Just-Intonation Grid Player
//!
//! `tonality_diamond` builds a tonality diamond from a set of integers, pairs
//! every value with every other as a just-intonation ratio, colors each
//! value by its prime family, and plays the ratios through a polyphonic
//! voice manager driven by pointer gestures.
//!
//! ## Architecture
//!
//! The library is organized in three layers:
//!
//! - **Model** - Number theory, grid generation, ratios, colors and the diamond itself
//! - **Voices** - Engine lifecycle and one voice per sounding pitch identity
//! - **Gestures** - Drags, chords and arpeggios turned into note requests
//!
//! A [`DiamondSession`](session::DiamondSession) ties the layers together
//! for a presentation front end.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tonality_diamond::prelude::*;
//!
//! // A 9-limit diamond played at G4 through the software synth
//! let config = DiamondConfig::default();
//! let mut session = DiamondSession::new(config, SynthBackend::new(44100.0));
//!
//! // Read the model
//! for cell in session.cells() {
//!     println!("{}", cell.tooltip);
//! }
//!
//! // Drag across two cells, then let the releases fire
//! session.pointer_down(1, Some(CellRef::new(0, 1)), 0.0);
//! session.pointer_move(1, Some(CellRef::new(1, 0)), 0.05);
//! session.pointer_up(1);
//!
//! let mut block = vec![0.0f32; 512];
//! session.backend_mut().render(&mut block);
//! session.advance(1.0);
//! ```

pub mod color;
pub mod config;
pub mod diamond;
pub mod engine;
pub mod gesture;
pub mod grid;
pub mod number;
pub mod ratio;
pub mod session;
pub mod synth;
pub mod voice;

#[cfg(feature = "wasm")]
pub mod wasm;

/// Prelude module for convenient imports
pub mod prelude {
    // Model
    pub use crate::color::{Hsl, PrimeHueMap, TileColor};
    pub use crate::diamond::{Axis, AxisRef, Cell, CellRef, Diamond, Header, PitchContext};
    pub use crate::grid::{build_grid, GridParams, GridSet};
    pub use crate::number::{fold_fraction, fold_to_octave, gcd, largest_prime_factor, reduce};
    pub use crate::ratio::{LabelMode, PitchKey, PitchRatio};

    // Voices
    pub use crate::engine::{
        AudioBackend, AudioEngineState, BackendState, EngineError, EngineEvent, EngineNotice,
        ToneId, Waveform,
    };
    pub use crate::synth::{Limiter, SynthBackend};
    pub use crate::voice::{Voice, VoiceId, VoiceManager, VoicePhase, VoiceSettings};

    // Gestures
    pub use crate::gesture::{ArmState, GestureContext, GestureController, PointerId};

    // Session
    pub use crate::config::DiamondConfig;
    pub use crate::session::DiamondSession;
}

// Re-export key types at crate root for convenience
pub use prelude::*;
