use ahash::AHashSet;
use chrono::{Days, NaiveDate};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::symbols::SymbolKey;

/// Symbols that crash reports referenced but the symbol server lacks.
/// Built once per run and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct MissingSymbolSet {
    symbols: AHashSet<SymbolKey>,
}

impl MissingSymbolSet {
    /// Parse the CSV feed: a header row, then `debug_file,debug_id,...` rows.
    /// Only debug files ending in `extension` are kept; short rows are ignored.
    pub fn from_feed(content: &[u8], extension: &str) -> Self {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(content);

        let mut symbols = AHashSet::new();
        for record in reader.byte_records() {
            let record = match record {
                Ok(record) => record,
                Err(err) => {
                    debug!("Skipping unreadable missing-symbols row: {}", err);
                    continue;
                }
            };
            if record.len() < 2 {
                continue;
            }
            let debug_file = String::from_utf8_lossy(&record[0]).trim().to_string();
            let debug_id = String::from_utf8_lossy(&record[1]).trim().to_string();
            if debug_file.ends_with(extension) {
                symbols.insert(SymbolKey::new(debug_file, debug_id));
            }
        }
        Self { symbols }
    }

    pub fn contains(&self, key: &SymbolKey) -> bool {
        self.symbols.contains(key)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl FromIterator<SymbolKey> for MissingSymbolSet {
    fn from_iter<I: IntoIterator<Item = SymbolKey>>(iter: I) -> Self {
        Self {
            symbols: iter.into_iter().collect(),
        }
    }
}

/// A daily missing-symbols publication.
pub trait FeedSource {
    /// The feed for `date`, or `None` if it was not published.
    fn fetch(&self, date: NaiveDate) -> Result<Option<Vec<u8>>, Error>;
}

pub struct HttpFeedSource {
    client: Client,
    url_template: String,
}

impl HttpFeedSource {
    /// `url_template` contains `{date}` placeholders for `YYYYMMDD`.
    pub fn new(url_template: &str, timeout: Duration) -> Result<Self, Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url_template: url_template.to_string(),
        })
    }

    pub fn url_for(&self, date: NaiveDate) -> String {
        self.url_template
            .replace("{date}", &date.format("%Y%m%d").to_string())
    }
}

impl FeedSource for HttpFeedSource {
    fn fetch(&self, date: NaiveDate) -> Result<Option<Vec<u8>>, Error> {
        let url = self.url_for(date);
        let response = self.client.get(&url).send()?;
        if response.status() != StatusCode::OK {
            debug!("{} returned {}", url, response.status());
            return Ok(None);
        }
        info!("Fetching missing symbols from {}", url);
        Ok(Some(response.bytes()?.to_vec()))
    }
}

/// Try the feed for `today` and the preceding days, `lookback_days` in
/// total. If none is available the result is empty.
pub fn fetch_missing_symbols(
    source: &dyn FeedSource,
    today: NaiveDate,
    lookback_days: u32,
    extension: &str,
) -> MissingSymbolSet {
    for days_back in 0..lookback_days {
        let Some(date) = today.checked_sub_days(Days::new(u64::from(days_back))) else {
            break;
        };
        match source.fetch(date) {
            Ok(Some(content)) => return MissingSymbolSet::from_feed(&content, extension),
            Ok(None) => {}
            Err(err) => warn!("Can't fetch missing symbols for {}: {}", date, err),
        }
    }
    warn!(
        "No missing-symbols feed in the last {} days, not filtering",
        lookback_days
    );
    MissingSymbolSet::default()
}
