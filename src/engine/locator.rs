use crate::data::fetcher::ListingSource;
use crate::data::listing::{self, PageStatus};

/// Zero-based `b_start:int` offsets are multiples of the folder page size.
pub const PAGE_STEP: u32 = 20;
/// Highest offset ever requested (31 pages).
pub const LAST_PAGE: u32 = 600;

/// What the scan does with a page that could not be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopPolicy {
    /// Treat it like the end of the listing.
    #[default]
    StopOnFailure,
    /// Move on to the next offset.
    SkipFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub date: u32,
    pub url: String,
    pub page: u32,
}

/// Scans offsets `0, 20, .., 600` and keeps the newest dated spreadsheet seen.
///
/// The listing is not sorted across pages, so every non-empty page is read.
/// A later page only replaces the current best on a strictly greater date.
pub async fn locate_latest<S: ListingSource>(source: &S, policy: StopPolicy) -> Option<CandidateFile> {
    let mut best: Option<CandidateFile> = None;

    for page in (0..=LAST_PAGE).step_by(PAGE_STEP as usize) {
        let body = match PageStatus::classify(source.fetch_page(page).await) {
            PageStatus::Listed(body) => body,
            PageStatus::Empty => {
                tracing::info!(page, "Empty listing page, stopping scan");
                break;
            }
            PageStatus::Unreachable => match policy {
                StopPolicy::StopOnFailure => {
                    tracing::warn!(page, "Listing page unreachable, stopping scan");
                    break;
                }
                StopPolicy::SkipFailed => {
                    tracing::warn!(page, "Listing page unreachable, skipping");
                    continue;
                }
            },
        };

        let Some(page_best) = listing::find_dates(&body).into_iter().max() else {
            tracing::debug!(page, "No dated spreadsheet on page");
            continue;
        };

        if best.as_ref().is_some_and(|b| page_best <= b.date) {
            continue;
        }
        if let Some(url) = listing::find_link(&body, page, Some(page_best)) {
            tracing::info!(page, date = page_best, %url, "Newer spreadsheet found");
            best = Some(CandidateFile {
                date: page_best,
                url,
                page,
            });
        }
    }

    match &best {
        Some(b) => tracing::info!(date = b.date, page = b.page, url = %b.url, "Latest spreadsheet located"),
        None => tracing::info!("No spreadsheet found on any page"),
    }
    best
}
