//! Typed records exchanged between workflow tasks.

mod book;
mod discovery;
mod itinerary;
mod preferences;

pub use book::{BookContext, BookInfo, BookMetadata};
pub use discovery::{
    AuthorSiteInfo, AuthorSites, CityDiscovery, CityInfo, LandmarkDiscovery, LandmarkInfo,
    RegionAnalysis, RegionCity, TravelRegion, union_cities,
};
pub use itinerary::{CityPlan, CityStop, MAX_DAYS_PER_CITY, MIN_DAYS_PER_CITY, TripItinerary};
pub use preferences::{Budget, Pace, TravelPreferences};
