pub mod cancel;
pub mod device;
pub mod eliminator;
pub mod fingerprint;
pub mod grouping;
pub mod imaging;
pub mod job;
pub mod loader;
pub mod macroblock;
pub mod matcher;

pub use cancel::CancellationToken;
pub use device::{CandidateNormalization, DeviceProfile, DeviceProfiles, ProfileError, Rect};
pub use eliminator::{DeletionFailure, DuplicateEliminator, EliminationRecord, EliminationReport};
pub use fingerprint::{Fingerprint, FingerprintConfig, FingerprintError};
pub use grouping::{DuplicateGroup, DuplicateGrouper, GroupingStrategy, PixelSampling, SimilarityTest};
pub use imaging::{FrameDecoder, FsDecoder, StructuralSimilarity, WindowedSsim};
pub use job::Job;
pub use loader::{Candidate, CandidateLoader, LoadError, LoaderConfig};
pub use macroblock::{BlockComparison, Macroblock};
pub use matcher::{CandidateMatcher, MatchError, MatchOutcome, ScoredCandidate};
