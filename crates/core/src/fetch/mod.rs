//! Remote data sources
//!
//! Both sources sit behind traits so that the orchestrator can be driven
//! by in-memory implementations. The HTTP implementations are enabled by
//! the `http-source` feature.

mod error;
pub mod ridership;
pub mod weather;

pub use error::{FetchError, FetchResult};
pub use ridership::{PageRequest, RemoteFetcher, RidershipPages, RidershipSource};
pub use weather::{HourlyWeather, Location, WeatherSource};

#[cfg(feature = "http-source")]
pub use ridership::HttpRidershipSource;
#[cfg(feature = "http-source")]
pub use weather::OpenMeteoSource;
