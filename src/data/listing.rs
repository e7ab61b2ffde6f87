use regex::Regex;
use std::sync::OnceLock;

use crate::text;

/// Shown by the folder view once `b_start:int` runs past the last item.
const EMPTY_FOLDER_MESSAGE: &str = "Atualmente não existem itens nessa pasta";

const FILE_STEM: &str = "xls_conformidade_site_";
const URL_CHARS: &str = r#"[^\s"'<>]"#;

static ANY_DATE_RE: OnceLock<Option<Regex>> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageStatus {
    Listed(String),
    Empty,
    Unreachable,
}

impl PageStatus {
    pub fn classify(body: Option<String>) -> Self {
        match body {
            None => Self::Unreachable,
            Some(body) if shows_empty_folder(&body) => Self::Empty,
            Some(body) => Self::Listed(body),
        }
    }
}

/// A failed fetch counts as empty, same as the end of the listing.
pub fn is_empty(body: Option<&str>, page_index: u32) -> bool {
    let empty = body.map_or(true, shows_empty_folder);
    tracing::debug!(page = page_index, empty, "Classified listing page");
    empty
}

fn shows_empty_folder(body: &str) -> bool {
    body.contains(&text::fold(EMPTY_FOLDER_MESSAGE))
}

fn any_date_re() -> Option<&'static Regex> {
    ANY_DATE_RE
        .get_or_init(|| {
            Regex::new(&format!(
                r"https?://{URL_CHARS}*{FILE_STEM}(\d{{8}}){URL_CHARS}*\.xlsx(?:/view)?"
            ))
            .ok()
        })
        .as_ref()
}

fn dated_re(date: u32) -> Option<Regex> {
    Regex::new(&format!(
        r"https?://{URL_CHARS}*{FILE_STEM}{date:08}{URL_CHARS}*\.xlsx(?:/view)?"
    ))
    .ok()
}

/// First spreadsheet link on the page, optionally pinned to one date stamp.
/// The returned URL is the direct download form (no `/view`).
pub fn find_link(body: &str, page_index: u32, date: Option<u32>) -> Option<String> {
    let found = match date {
        None => any_date_re()?.find(body),
        Some(d) => dated_re(d)?.find(body),
    };
    match found {
        Some(m) => {
            let link = strip_view(m.as_str());
            tracing::debug!(page = page_index, ?date, %link, "Spreadsheet link found");
            Some(link)
        }
        None => {
            tracing::debug!(page = page_index, ?date, "No spreadsheet link on page");
            None
        }
    }
}

/// Every `YYYYMMDD` stamp on the page, in document order.
pub fn find_dates(body: &str) -> Vec<u32> {
    let Some(re) = any_date_re() else {
        return Vec::new();
    };
    re.captures_iter(body)
        .filter_map(|c| c.get(1))
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

pub fn strip_view(link: &str) -> String {
    link.replace("/view", "")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <a href="https://www.gov.br/anvisa/arquivos/xls_conformidade_site_20240115_103000.xlsx/view">xls_conformidade_site_20240115_103000.xlsx</a>
        <a href="https://www.gov.br/anvisa/arquivos/xls_conformidade_site_20240312_091500.xlsx/view">março</a>
        <a href="https://www.gov.br/anvisa/arquivos/xls_conformidade_site_20231201_080000.xlsx">dezembro</a>
        <a href="https://www.gov.br/anvisa/arquivos/lista_precos.pdf">pdf</a>
    "#;

    #[test]
    fn classify_pages() {
        assert_eq!(PageStatus::classify(None), PageStatus::Unreachable);
        let empty = text::fold("<p>Atualmente não existem itens nessa pasta.</p>");
        assert_eq!(PageStatus::classify(Some(empty.clone())), PageStatus::Empty);
        assert!(matches!(PageStatus::classify(Some(PAGE.into())), PageStatus::Listed(_)));

        assert!(is_empty(None, 0));
        assert!(is_empty(Some(&empty), 0));
        assert!(!is_empty(Some(PAGE), 0));
    }

    #[test]
    fn finds_all_dates_in_order() {
        assert_eq!(find_dates(PAGE), vec![20240115, 20240312, 20231201]);
        assert!(find_dates("nothing here").is_empty());
    }

    #[test]
    fn first_link_strips_view() {
        assert_eq!(
            find_link(PAGE, 0, None).as_deref(),
            Some("https://www.gov.br/anvisa/arquivos/xls_conformidade_site_20240115_103000.xlsx")
        );
    }

    #[test]
    fn dated_link() {
        assert_eq!(
            find_link(PAGE, 0, Some(20240312)).as_deref(),
            Some("https://www.gov.br/anvisa/arquivos/xls_conformidade_site_20240312_091500.xlsx")
        );
        assert_eq!(
            find_link(PAGE, 0, Some(20231201)).as_deref(),
            Some("https://www.gov.br/anvisa/arquivos/xls_conformidade_site_20231201_080000.xlsx")
        );
        assert_eq!(find_link(PAGE, 0, Some(20250101)), None);
    }

    #[test]
    fn short_stamp_is_ignored() {
        let body = "https://x.gov.br/xls_conformidade_site_2024011.xlsx";
        assert!(find_dates(body).is_empty());
        assert_eq!(find_link(body, 0, None), None);
    }

    #[test]
    fn link_patterns_compile() {
        assert!(any_date_re().is_some());
        assert!(dated_re(20240312).is_some());
        assert!(dated_re(0).is_some_and(|re| re.as_str().contains("site_00000000")));
    }
}
