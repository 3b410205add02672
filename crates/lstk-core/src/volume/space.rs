//! Space and role tags carried by every volume.

use std::fmt;

/// Coordinate space a volume is sampled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Space {
    /// Acquisition grid of the T1-weighted input.
    NativeT1,
    /// Acquisition grid of the FLAIR input. All published outputs live here.
    NativeFlair,
    /// Standardized template space shared by all subjects.
    Atlas,
}

impl Space {
    /// Short tag used in artifact names (`space-<tag>`).
    pub fn tag(self) -> &'static str {
        match self {
            Space::NativeT1 => "t1",
            Space::NativeFlair => "flair",
            Space::Atlas => "mni",
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// What the voxel values of a volume mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    /// Head image as acquired (skull present).
    Anatomical,
    /// Skull-stripped anatomical image.
    BrainExtracted,
    /// Binary brain mask.
    Mask,
    /// Lesion probability in `[0, 1]`.
    ProbabilityMap,
    /// Binary lesion segmentation.
    Segmentation,
    /// Lesion segmentation relabelled with anatomical region codes.
    AnnotatedSegmentation,
    /// Atlas map of anatomical region codes.
    RegionLabels,
}

impl Role {
    /// Suffix used in artifact names.
    pub fn tag(self) -> &'static str {
        match self {
            Role::Anatomical => "anat",
            Role::BrainExtracted => "brain",
            Role::Mask => "mask",
            Role::ProbabilityMap => "probmap",
            Role::Segmentation => "seg",
            Role::AnnotatedSegmentation => "annot",
            Role::RegionLabels => "regions",
        }
    }

    /// Interpolation policy that must be used whenever a volume of this role
    /// is resampled.
    pub fn interpolation(self) -> Interpolation {
        match self {
            Role::Anatomical | Role::BrainExtracted | Role::ProbabilityMap => {
                Interpolation::Linear
            }
            Role::Mask => Interpolation::Nearest,
            Role::Segmentation | Role::AnnotatedSegmentation | Role::RegionLabels => {
                Interpolation::Label
            }
        }
    }

    /// Roles holding integer codes rather than intensities.
    pub fn is_discrete(self) -> bool {
        !matches!(self.interpolation(), Interpolation::Linear)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Resampling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    /// Trilinear, for continuous intensities and probabilities.
    Linear,
    /// Nearest neighbour, for binary masks.
    Nearest,
    /// Label-preserving; in-process this is nearest neighbour, external
    /// resamplers may use a smoother label vote.
    Label,
}
