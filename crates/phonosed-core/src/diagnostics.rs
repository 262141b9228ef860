//! Structured reporting of recoverable conditions.
//!
//! Operations that can degrade gracefully return an [`Outcome`], pairing the
//! computed value with every [`Diagnostic`] raised along the way. Each
//! diagnostic is also emitted through the `log` facade at `warn` level so
//! command-line users see it without inspecting the outcome.

use std::fmt;

/// A recoverable condition encountered during a computation.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// A requested atom group matched no atoms and was skipped.
    EmptyGroup { label: String },
    /// Every requested group was empty; all atoms were used as one group.
    AllGroupsEmpty,
    /// Both explicit indices and type labels were given; indices were used.
    ConflictingSelectors,
    /// The trajectory has no frames or no atoms.
    EmptyTrajectory { n_frames: usize, n_atoms: usize },
    /// No k-vectors were supplied.
    EmptyKPoints,
    /// Reciprocal projections along the k-direction were negligible, so the
    /// k-path extent fell back to 2π/|a1|.
    ReciprocalFallback { extent: f64 },
    /// The band filter width was too small to apply; input returned unchanged.
    FilterWidthNegligible { sigma: f64 },
    /// Automatic iSED rescaling was skipped because the peak amplitude was
    /// negligible.
    RescaleSkipped { peak: f64 },
    /// An unrecognised chiral-phase mode was requested; output is zero.
    UnknownChiralMode(String),
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::EmptyGroup { label } => {
                write!(f, "No atoms found for group {}; skipping", label)
            }
            Diagnostic::AllGroupsEmpty => {
                write!(f, "All requested atom groups are empty; using all atoms as one group")
            }
            Diagnostic::ConflictingSelectors => {
                write!(f, "Both atom indices and atom types given; using atom indices")
            }
            Diagnostic::EmptyTrajectory { n_frames, n_atoms } => write!(
                f,
                "Trajectory has {} frames and {} atoms; result is empty",
                n_frames, n_atoms
            ),
            Diagnostic::EmptyKPoints => write!(f, "No k-vectors supplied; result has no k columns"),
            Diagnostic::ReciprocalFallback { extent } => write!(
                f,
                "Reciprocal projections too small; using 2π/|a1| = {:.4} for the k-path extent",
                extent
            ),
            Diagnostic::FilterWidthNegligible { sigma } => write!(
                f,
                "Filter width {:.3e} THz too small; returning input unchanged",
                sigma
            ),
            Diagnostic::RescaleSkipped { peak } => write!(
                f,
                "Peak reconstructed amplitude {:.3e} is negligible; auto-rescaling skipped",
                peak
            ),
            Diagnostic::UnknownChiralMode(mode) => {
                write!(f, "Unknown chiral-phase mode '{}'; returning zeros", mode)
            }
        }
    }
}

/// Collects diagnostics while logging each one as it arrives.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic and emit it as a warning.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        log::warn!("{}", diagnostic);
        self.entries.push(diagnostic);
    }

    /// Absorb diagnostics already logged by a nested call.
    pub fn extend(&mut self, other: Vec<Diagnostic>) {
        self.entries.extend(other);
    }

    /// Wrap a value together with the collected diagnostics.
    pub fn finish<T>(self, value: T) -> Outcome<T> {
        Outcome {
            value,
            diagnostics: self.entries,
        }
    }
}

/// A computed value plus the recoverable conditions met while computing it.
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub value: T,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Outcome<T> {
    /// Discard the diagnostics (they have already been logged).
    pub fn into_value(self) -> T {
        self.value
    }

    pub fn has(&self, predicate: impl Fn(&Diagnostic) -> bool) -> bool {
        self.diagnostics.iter().any(predicate)
    }
}
