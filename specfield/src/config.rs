//! Runtime configuration, constructed once at startup and passed explicitly
//! into [`Domain`](crate::domain::Domain) and the basis constructors.

/// Planning rigor requested from the transform planners.
///
/// Retained plans are keyed on shape and dtype; the rigor is recorded with
/// each plan build so runs remain reproducible under different settings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PlanRigor {
    /// Cheap planning heuristics.
    Estimate,
    /// Measure a few candidate kernels.
    Measure,
    /// Wider kernel search.
    Patient,
    /// Exhaustive kernel search.
    Exhaustive,
}

impl PlanRigor {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::Estimate => "estimate",
            Self::Measure => "measure",
            Self::Patient => "patient",
            Self::Exhaustive => "exhaustive",
        }
    }
}

/// Transform kernel selection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Library {
    /// Planned kernels, built lazily and retained for reuse.
    Planned,
    /// Definition summations, evaluated at call time with no cached state.
    Direct,
}

/// Engine-wide settings read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// Let distributed transposes reuse one exchange buffer for input and
    /// output instead of keeping separate ones.
    pub in_place: bool,
    /// Planning rigor for retained transform plans.
    pub rigor: PlanRigor,
    /// Transform several fields with identical scales as one super-array.
    pub group_transforms: bool,
    /// Batch several fields into a single transpose plan.
    pub group_transposes: bool,
    /// Enter a barrier on the sub-communicator before each transpose, for
    /// instrumentation determinism.
    pub sync_transposes: bool,
    /// Kernel library assigned to bases that do not choose their own.
    pub default_library: Library,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            in_place: false,
            rigor: PlanRigor::Estimate,
            group_transforms: false,
            group_transposes: false,
            sync_transposes: false,
            default_library: Library::Planned,
        }
    }
}
