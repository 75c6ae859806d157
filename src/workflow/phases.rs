//! The three automated phases of an itinerary run.
//!
//! ```text
//! metadata_stage
//! └─ book_metadata_pipeline [researcher → formatter]      → book_metadata
//! discovery_stage
//! ├─ book_context_pipeline  [researcher → formatter]      → book_context
//! ├─ reader_profile_agent                                 → reader_profile
//! ├─ parallel_discovery (concurrent)
//! │  ├─ city_pipeline       [researcher → formatter]      → city_discovery
//! │  ├─ landmark_pipeline   [researcher → formatter]      → landmark_discovery
//! │  └─ author_pipeline     [researcher → formatter]      → author_sites
//! └─ region_analyzer                                      → region_analysis
//!   (checkpoint: selected_regions, selected_cities)
//! composition_stage
//! └─ trip_composer                                        → final_itinerary
//! ```

use std::time::Duration;

use super::instructions;
use super::keys;
use crate::compose::{FanOutGroup, OutputShape, Phase, PhaseBuilder, Sequence, TaskDescriptor};
use crate::errors::ComposeError;
use crate::models::{
    AuthorSites, BookContext, BookMetadata, CityDiscovery, LandmarkDiscovery, RegionAnalysis,
    TripItinerary,
};
use crate::tools::{GET_USER_PREFERENCES, GOOGLE_SEARCH, SEARCH_BOOK};

pub const METADATA_STAGE: &str = "metadata_stage";
pub const DISCOVERY_STAGE: &str = "discovery_stage";
pub const COMPOSITION_STAGE: &str = "composition_stage";

/// Per-phase deadlines. The run's overall timeout still caps each of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseDeadlines {
    pub metadata: Duration,
    pub discovery: Duration,
    pub composition: Duration,
}

impl Default for PhaseDeadlines {
    fn default() -> Self {
        Self {
            metadata: Duration::from_secs(120),
            discovery: Duration::from_secs(300),
            composition: Duration::from_secs(180),
        }
    }
}

/// Research then format, the formatter writing `output` in `shape`.
fn pipeline(
    name: &str,
    researcher: TaskDescriptor,
    formatter: &str,
    formatter_instruction: String,
    output: &str,
    shape: OutputShape,
) -> Sequence {
    let formatter = TaskDescriptor::new(formatter, formatter_instruction)
        .reads([researcher.writes.clone()])
        .writes(output)
        .shape(shape);
    Sequence::new(name).then(researcher).then(formatter)
}

pub fn metadata_stage(deadline: Duration) -> Result<Phase, ComposeError> {
    let researcher = TaskDescriptor::new(
        "book_metadata_researcher",
        instructions::book_metadata_researcher(),
    )
    .reads([keys::BOOK_TITLE, keys::AUTHOR])
    .capability(SEARCH_BOOK);

    PhaseBuilder::new(METADATA_STAGE)
        .deadline(deadline)
        .sequence(pipeline(
            "book_metadata_pipeline",
            researcher,
            "book_metadata_formatter",
            instructions::book_metadata_formatter(),
            keys::BOOK_METADATA,
            OutputShape::of::<BookMetadata>("BookMetadata"),
        ))
        .build()
}

/// Discovery is specialised with the exact title and author found in the
/// metadata stage so every search targets the right book.
pub fn discovery_stage(book: &BookMetadata, deadline: Duration) -> Result<Phase, ComposeError> {
    let context_researcher = TaskDescriptor::new(
        "book_context_researcher",
        instructions::book_context_researcher(book),
    )
    .reads([keys::BOOK_METADATA])
    .capability(GOOGLE_SEARCH);

    let reader_profile = TaskDescriptor::new("reader_profile_agent", instructions::reader_profile())
        .writes(keys::READER_PROFILE)
        .capability(GET_USER_PREFERENCES);

    let city_researcher = TaskDescriptor::new("city_researcher", instructions::city_researcher(book))
        .reads([keys::BOOK_METADATA, keys::BOOK_CONTEXT])
        .capability(GOOGLE_SEARCH);
    let landmark_researcher =
        TaskDescriptor::new("landmark_researcher", instructions::landmark_researcher(book))
            .reads([keys::BOOK_METADATA, keys::BOOK_CONTEXT])
            .capability(GOOGLE_SEARCH);
    let author_researcher =
        TaskDescriptor::new("author_researcher", instructions::author_researcher(book))
            .reads([keys::BOOK_METADATA])
            .capability(GOOGLE_SEARCH);

    let discovery = FanOutGroup::new("parallel_discovery")
        .child(pipeline(
            "city_pipeline",
            city_researcher,
            "city_formatter",
            instructions::city_formatter(),
            keys::CITY_DISCOVERY,
            OutputShape::of::<CityDiscovery>("CityDiscovery"),
        ))
        .child(pipeline(
            "landmark_pipeline",
            landmark_researcher,
            "landmark_formatter",
            instructions::landmark_formatter(),
            keys::LANDMARK_DISCOVERY,
            OutputShape::of::<LandmarkDiscovery>("LandmarkDiscovery"),
        ))
        .child(pipeline(
            "author_pipeline",
            author_researcher,
            "author_formatter",
            instructions::author_formatter(),
            keys::AUTHOR_SITES,
            OutputShape::of::<AuthorSites>("AuthorSites"),
        ));

    let region_analyzer = TaskDescriptor::new("region_analyzer", instructions::region_analyzer())
        .reads([
            keys::BOOK_METADATA,
            keys::CITY_DISCOVERY,
            keys::LANDMARK_DISCOVERY,
            keys::AUTHOR_SITES,
        ])
        .writes(keys::REGION_ANALYSIS)
        .shape(OutputShape::of::<RegionAnalysis>("RegionAnalysis"));

    PhaseBuilder::new(DISCOVERY_STAGE)
        .deadline(deadline)
        .sequence(pipeline(
            "book_context_pipeline",
            context_researcher,
            "book_context_formatter",
            instructions::book_context_formatter(),
            keys::BOOK_CONTEXT,
            OutputShape::of::<BookContext>("BookContext"),
        ))
        .task(reader_profile)
        .fan_out(discovery)
        .task(region_analyzer)
        .build()
}

pub fn composition_stage(deadline: Duration) -> Result<Phase, ComposeError> {
    let composer = TaskDescriptor::new("trip_composer", instructions::trip_composer())
        .reads([
            keys::BOOK_METADATA,
            keys::BOOK_CONTEXT,
            keys::READER_PROFILE,
            keys::SELECTED_REGIONS,
            keys::SELECTED_CITIES,
            keys::LANDMARK_DISCOVERY,
            keys::AUTHOR_SITES,
        ])
        .writes(keys::FINAL_ITINERARY)
        .shape(OutputShape::of::<TripItinerary>("TripItinerary"));

    PhaseBuilder::new(COMPOSITION_STAGE)
        .deadline(deadline)
        .task(composer)
        .build()
}
