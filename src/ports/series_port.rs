//! Historical series source.

use crate::domain::error::ForecastError;
use crate::domain::series::Series;

pub trait SeriesPort {
    /// Full history for `property_id`, ordered by timestamp.
    fn fetch_series(&self, property_id: &str) -> Result<Series, ForecastError>;
}
