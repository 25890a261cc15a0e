//! News and company scrapers for Russian financial sites.
//!
//! Every source implements [`NewsSource`]; [`SourceRegistry`] builds the
//! enabled set from `[parsers]` config. All HTTP goes through [`Fetcher`].

pub mod companies;
pub mod fetch;
pub mod sources;

pub use companies::{
    ListedCompany, UNKNOWN_COMPANY_NAME, extract_company_image, fetch_company_image,
    fetch_stock_list, parse_stock_list,
};
pub use fetch::Fetcher;
pub use sources::{
    BcsSource, KommersantSource, NewsSource, RbcSource, SourceRegistry, TradingViewSource,
};
