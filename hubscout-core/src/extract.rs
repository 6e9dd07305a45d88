//! Field extraction from GitHub search and repository pages.
//!
//! Only two extraction points are supported: result links on a search page
//! and the owner/language sidebar of a repository page.

use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::trace;
use url::Url;

use crate::output::{ExtraInfo, LanguageStats, SearchResultRecord};

const RESULT_LINK_SELECTOR: &str = r#"div[class*="search-title"] a"#;
const OWNER_SELECTOR: &str = r#"[itemprop="author"] > a"#;
const SIDEBAR_ROW_SELECTOR: &str = r#"div[class*="BorderGrid-row"]"#;
const LANGUAGES_HEADING: &str = "Languages";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("missing required field: {0}")]
    MissingRequiredField(&'static str),
    #[error("invalid selector {selector}: {reason}")]
    Selector {
        selector: &'static str,
        reason: String,
    },
    #[error("invalid base url: {0}")]
    BaseUrl(#[from] url::ParseError),
}

#[derive(Debug, Clone)]
pub struct GithubExtractor {
    base_url: Url,
    result_links: Selector,
    owner: Selector,
    sidebar_rows: Selector,
    headings: Selector,
    lists: Selector,
    spans: Selector,
}

impl GithubExtractor {
    pub fn new(base_url: &str) -> Result<Self, ExtractError> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            result_links: selector(RESULT_LINK_SELECTOR)?,
            owner: selector(OWNER_SELECTOR)?,
            sidebar_rows: selector(SIDEBAR_ROW_SELECTOR)?,
            headings: selector("h2")?,
            lists: selector("ul")?,
            spans: selector("span")?,
        })
    }

    /// Result links in document order. Anchors without a usable `href` are
    /// skipped and relative links are resolved against the base URL.
    pub fn parse_search_results(&self, html: &str) -> Vec<SearchResultRecord> {
        let document = Html::parse_document(html);
        document
            .select(&self.result_links)
            .filter_map(|anchor| anchor.value().attr("href"))
            .filter(|href| !href.trim().is_empty())
            .filter_map(|href| match self.base_url.join(href) {
                Ok(url) => Some(SearchResultRecord::stub(url)),
                Err(err) => {
                    trace!(href, error = %err, "skipping unresolvable result link");
                    None
                }
            })
            .collect()
    }

    /// Owner is required; the language breakdown is optional.
    pub fn parse_extras(&self, html: &str) -> Result<ExtraInfo, ExtractError> {
        let document = Html::parse_document(html);
        let owner = document
            .select(&self.owner)
            .next()
            .map(|anchor| anchor.text().collect::<String>().trim().to_string())
            .filter(|owner| !owner.is_empty())
            .ok_or(ExtractError::MissingRequiredField("owner"))?;

        Ok(ExtraInfo {
            owner,
            language_stats: self.language_stats(&document),
        })
    }

    fn language_stats(&self, document: &Html) -> Option<LanguageStats> {
        let row = document.select(&self.sidebar_rows).find(|row| {
            row.select(&self.headings)
                .any(|heading| own_text(heading).trim() == LANGUAGES_HEADING)
        })?;
        let list = row.select(&self.lists).next()?;

        let stats = list
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|item| item.value().name() == "li")
            .filter_map(|item| {
                let mut texts = item
                    .select(&self.spans)
                    .map(own_text)
                    .map(|text| text.trim().to_string())
                    .filter(|text| !text.is_empty());
                let label = texts.next()?;
                let percent = texts.next()?;
                Some((label, percent.trim_end_matches('%').to_string()))
            })
            .collect::<LanguageStats>();

        if stats.is_empty() {
            None
        } else {
            Some(stats)
        }
    }
}

fn selector(source: &'static str) -> Result<Selector, ExtractError> {
    Selector::parse(source).map_err(|err| ExtractError::Selector {
        selector: source,
        reason: format!("{err:?}"),
    })
}

/// Text of the element's direct text children, excluding nested elements.
fn own_text(element: ElementRef<'_>) -> String {
    element
        .children()
        .filter_map(|node| node.value().as_text().map(|text| text.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_FIXTURE: &str = r#"
<html><body>
  <div class="search-results">
    <div class="f4 search-title">
      <a href="/user/repo1">user/repo1</a>
    </div>
    <div class="search-title text-bold">
      <a href="/user/repo2">user/<em>repo2</em></a>
    </div>
    <div class="search-title">
      <a name="anchor-without-target">nothing</a>
    </div>
    <div class="other">
      <a href="/not/a/result">ignored</a>
    </div>
  </div>
</body></html>
"#;

    fn repo_fixture(owner: Option<&str>, languages: &[(&str, &str)]) -> String {
        let owner_html = owner
            .map(|name| format!(r#"<span itemprop="author"><a href="/{name}">{name}</a></span>"#))
            .unwrap_or_default();
        let languages_html = if languages.is_empty() {
            String::new()
        } else {
            let items = languages
                .iter()
                .map(|(label, percent)| {
                    format!(
                        r##"<li class="d-inline"><a href="#"><span class="color-fg-default text-bold mr-1">{label}</span><span>{percent}</span></a></li>"##
                    )
                })
                .collect::<String>();
            format!(
                r#"<div class="BorderGrid-row"><div class="BorderGrid-cell"><h2 class="h4 mb-3">Languages</h2><ul class="list-style-none">{items}</ul></div></div>"#
            )
        };
        format!(
            r#"<html><body><div class="AppHeader-context">{owner_html}</div>
<div class="BorderGrid">
  <div class="BorderGrid-row"><div class="BorderGrid-cell"><h2 class="h4">About</h2><ul><li><span>Topic</span><span>x%</span></li></ul></div></div>
  {languages_html}
</div></body></html>"#
        )
    }

    fn extractor() -> GithubExtractor {
        GithubExtractor::new("https://github.com").unwrap()
    }

    #[test]
    fn search_results_in_document_order_without_hrefless_anchors() {
        let results = extractor().parse_search_results(SEARCH_FIXTURE);
        assert_eq!(
            results,
            vec![
                SearchResultRecord::stub("https://github.com/user/repo1"),
                SearchResultRecord::stub("https://github.com/user/repo2"),
            ]
        );
    }

    #[test]
    fn empty_and_blank_hrefs_are_skipped() {
        let html = r#"<div>
  <div class="search-title"><a href="">Empty</a></div>
  <div class="search-title"><a href="   ">Blank</a></div>
  <div class="search-title"><a href="/repo3">repo3</a></div>
</div>"#;
        let results = extractor().parse_search_results(html);
        assert_eq!(
            results,
            vec![SearchResultRecord::stub("https://github.com/repo3")]
        );
    }

    #[test]
    fn absolute_result_links_are_kept() {
        let html =
            r#"<div class="search-title"><a href="https://gist.github.com/u/1">gist</a></div>"#;
        let results = extractor().parse_search_results(html);
        assert_eq!(results[0].url, "https://gist.github.com/u/1");
    }

    #[test]
    fn extras_with_language_breakdown() {
        let html = repo_fixture(
            Some("owner_name"),
            &[("Python", "50%"), ("JavaScript", "50%")],
        );
        let extra = extractor().parse_extras(&html).unwrap();
        assert_eq!(extra.owner, "owner_name");
        let expected: LanguageStats = [
            ("Python".to_string(), "50".to_string()),
            ("JavaScript".to_string(), "50".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(extra.language_stats, Some(expected));
    }

    #[test]
    fn extras_without_language_section_mark_stats_absent() {
        let html = repo_fixture(Some("owner_name"), &[]);
        let extra = extractor().parse_extras(&html).unwrap();
        assert_eq!(extra.owner, "owner_name");
        assert_eq!(extra.language_stats, None);
    }

    #[test]
    fn extras_without_owner_fail() {
        let html = repo_fixture(None, &[("Rust", "100.0%")]);
        let err = extractor().parse_extras(&html).unwrap_err();
        assert!(matches!(err, ExtractError::MissingRequiredField("owner")));
    }

    #[test]
    fn owner_text_is_trimmed() {
        let html = r#"<div itemprop="author"><a href="/octo">
            octocat
        </a></div>"#;
        let extra = extractor().parse_extras(html).unwrap();
        assert_eq!(extra.owner, "octocat");
    }

    #[test]
    fn language_items_missing_a_percentage_are_skipped() {
        let html = r#"<span itemprop="author"><a>me</a></span>
<div class="BorderGrid-row"><h2>Languages</h2><ul>
  <li><span>Go</span><span>70.1%</span></li>
  <li><span>Other</span></li>
</ul></div>"#;
        let stats = extractor().parse_extras(html).unwrap().language_stats.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats.get("Go"), Some("70.1"));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(
            GithubExtractor::new("not a url"),
            Err(ExtractError::BaseUrl(_))
        ));
    }
}
