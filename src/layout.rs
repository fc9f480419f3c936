//! Reading-order recovery for one PDF page.
//!
//! Strategies are tried in a fixed order and the first output passing the
//! minimum-content heuristic wins:
//!
//! 1. single-column: the extraction backend's own reading-order text;
//! 2. two-column: positioned words split at the horizontal midpoint, left
//!    column read before the right;
//! 3. word assembly: word boxes clustered into lines by vertical
//!    proximity, the slowest but most resilient path.
//!
//! Where positions are available (strategies 2 and 3), lines falling into
//! the header or footer band are dropped unless they are long and densely
//! alphabetic, so page furniture goes but short legitimate paragraphs near
//! the page edge stay.

use crate::config::{
    BAND_KEEP_ALPHA_DENSITY, BAND_KEEP_MIN_ALPHA, COLUMN_GUTTER_RATIO, FOOTER_BAND_RATIO,
    HEADER_BAND_RATIO, LINE_CLUSTER_GAP, MIN_PAGE_WORDS, MIN_SINGLE_COLUMN_CHARS,
    MIN_TWO_COLUMN_CHARS, MIN_WORD_ASSEMBLY_CHARS,
};
use crate::normalize;
use crate::pdf::{Page, WordBox};

/// One recovered line with the vertical position it came from. Lines from
/// the plain-text path carry no position.
#[derive(Debug, Clone)]
pub struct Line {
    pub text: String,
    pub top: Option<f32>,
}

/// One page's recovered lines, ready for block building.
#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub lines: Vec<String>,
}

impl PageText {
    /// All lines joined into one cleaned, space-separated string.
    pub fn flat_text(&self) -> String {
        normalize::clean_extracted(&self.lines.join("\n"))
    }
}

/// One extraction strategy. Returns `None` when it cannot produce output
/// meeting its minimum-content bar.
trait LayoutStrategy {
    fn name(&self) -> &'static str;
    fn extract(&self, page: &Page) -> Option<Vec<Line>>;
}

struct SingleColumn;
struct TwoColumn;
struct WordAssembly;

/// Recover reading-order lines for a page, or `None` when every strategy
/// fails (the page is then skipped by the caller).
pub fn extract_lines(page: &Page) -> Option<PageText> {
    let strategies: [&dyn LayoutStrategy; 3] = [&SingleColumn, &TwoColumn, &WordAssembly];

    for strategy in strategies {
        if let Some(lines) = strategy.extract(page) {
            tracing::debug!(
                page = page.number,
                strategy = strategy.name(),
                lines = lines.len(),
                "layout recovered"
            );
            return Some(PageText {
                number: page.number,
                lines: lines.into_iter().map(|l| l.text).collect(),
            });
        }
    }

    tracing::debug!(page = page.number, "all layout strategies failed");
    None
}

fn content_chars(lines: &[Line]) -> usize {
    lines
        .iter()
        .map(|l| normalize::clean_extracted(&l.text).chars().count())
        .sum()
}

fn word_count(lines: &[Line]) -> usize {
    lines
        .iter()
        .map(|l| l.text.split_whitespace().count())
        .sum()
}

fn accepts(lines: &[Line], min_chars: usize) -> bool {
    !lines.is_empty() && word_count(lines) >= MIN_PAGE_WORDS && content_chars(lines) >= min_chars
}

impl LayoutStrategy for SingleColumn {
    fn name(&self) -> &'static str {
        "single-column"
    }

    fn extract(&self, page: &Page) -> Option<Vec<Line>> {
        let text = page.plain_text.as_deref()?;
        let lines: Vec<Line> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| Line {
                text: l.to_string(),
                top: None,
            })
            .collect();

        accepts(&lines, MIN_SINGLE_COLUMN_CHARS).then_some(lines)
    }
}

impl LayoutStrategy for TwoColumn {
    fn name(&self) -> &'static str {
        "two-column"
    }

    fn extract(&self, page: &Page) -> Option<Vec<Line>> {
        if page.words.is_empty() {
            return None;
        }

        let gutter = page.width * COLUMN_GUTTER_RATIO;
        let mid = page.width / 2.0;
        let left: Vec<&WordBox> = page
            .words
            .iter()
            .filter(|w| w.x < mid - gutter)
            .collect();
        let right: Vec<&WordBox> = page.words.iter().filter(|w| w.x >= mid + gutter).collect();

        // A genuine two-column page has material on both sides; otherwise
        // defer to word assembly, which reads the full width.
        if left.is_empty() || right.is_empty() {
            return None;
        }

        let mut lines = cluster_into_lines(&left);
        lines.extend(cluster_into_lines(&right));
        let lines = filter_margin_bands(lines, page.height);

        accepts(&lines, MIN_TWO_COLUMN_CHARS).then_some(lines)
    }
}

impl LayoutStrategy for WordAssembly {
    fn name(&self) -> &'static str {
        "word-assembly"
    }

    fn extract(&self, page: &Page) -> Option<Vec<Line>> {
        if page.words.is_empty() {
            return None;
        }

        let all: Vec<&WordBox> = page.words.iter().collect();
        let lines = cluster_into_lines(&all);
        let lines = filter_margin_bands(lines, page.height);

        accepts(&lines, MIN_WORD_ASSEMBLY_CHARS).then_some(lines)
    }
}

/// Cluster word boxes into lines: sort by vertical position, start a new
/// line whenever the gap exceeds the cluster tolerance, then order each
/// line left to right.
fn cluster_into_lines(words: &[&WordBox]) -> Vec<Line> {
    if words.is_empty() {
        return Vec::new();
    }

    let mut sorted: Vec<&WordBox> = words.to_vec();
    sorted.sort_by(|a, b| {
        a.top
            .partial_cmp(&b.top)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal))
    });

    let mut clusters: Vec<Vec<&WordBox>> = Vec::new();
    let mut current_top = f32::NEG_INFINITY;
    for word in sorted {
        if (word.top - current_top).abs() > LINE_CLUSTER_GAP {
            clusters.push(Vec::new());
            current_top = word.top;
        }
        clusters
            .last_mut()
            .expect("cluster pushed above")
            .push(word);
    }

    clusters
        .into_iter()
        .map(|mut cluster| {
            cluster.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal));
            let top = cluster.first().map(|w| w.top);
            let text = cluster
                .iter()
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            Line { text, top }
        })
        .filter(|line| !line.text.trim().is_empty())
        .collect()
}

fn is_densely_alphabetic(text: &str) -> bool {
    let total = text.chars().filter(|c| !c.is_whitespace()).count();
    let alpha = text.chars().filter(|c| c.is_alphabetic()).count();
    alpha >= BAND_KEEP_MIN_ALPHA && total > 0 && alpha as f32 / total as f32 >= BAND_KEEP_ALPHA_DENSITY
}

/// Drop lines sitting in the header or footer band unless they read like
/// real prose (long, mostly letters). Page numbers and running titles go;
/// a short paragraph hugging the margin stays.
fn filter_margin_bands(lines: Vec<Line>, page_height: f32) -> Vec<Line> {
    let top_cut = page_height * HEADER_BAND_RATIO;
    let bottom_cut = page_height * (1.0 - FOOTER_BAND_RATIO);

    lines
        .into_iter()
        .filter(|line| match line.top {
            Some(top) if top < top_cut || top > bottom_cut => is_densely_alphabetic(&line.text),
            _ => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, x: f32, top: f32) -> WordBox {
        WordBox {
            text: text.to_string(),
            x,
            top,
        }
    }

    fn page_with_words(words: Vec<WordBox>) -> Page {
        Page {
            number: 1,
            width: 612.0,
            height: 792.0,
            words,
            plain_text: None,
        }
    }

    fn body_words(x: f32, top: f32) -> Vec<WordBox> {
        // Enough prose to clear the word and char minimums.
        let text = "ogrenci ders kaydini her yariyil basinda danisman onayi ile yenilemek zorundadir aksi halde kayit gecersiz sayilir";
        text.split(' ')
            .enumerate()
            .map(|(i, w)| word(w, x + i as f32 * 12.0, top))
            .collect()
    }

    #[test]
    fn single_column_uses_backend_text() {
        let page = Page {
            number: 1,
            width: 612.0,
            height: 792.0,
            words: vec![],
            plain_text: Some(
                "Devamsizlik siniri teorik derslerde yuzde otuzdur.\nUygulamali derslerde yuzde yirmidir ve asilamaz.".to_string(),
            ),
        };

        let result = extract_lines(&page).expect("single column accepts");
        assert_eq!(result.lines.len(), 2);
    }

    #[test]
    fn short_backend_text_falls_through_to_word_assembly() {
        let mut words = body_words(50.0, 300.0);
        words.extend(body_words(50.0, 320.0));
        let mut page = page_with_words(words);
        page.plain_text = Some("kisa".to_string());

        let result = extract_lines(&page).expect("word assembly accepts");
        assert!(result.lines.len() >= 2);
        assert!(result.lines[0].contains("ogrenci"));
    }

    #[test]
    fn two_column_reads_left_before_right() {
        let mut words = body_words(40.0, 300.0);
        words.extend(body_words(400.0, 300.0).into_iter().map(|mut w| {
            w.text = format!("sag{}", w.text);
            w
        }));
        let page = page_with_words(words);

        let result = extract_lines(&page).expect("two column accepts");
        let joined = result.lines.join(" ");
        let left_pos = joined.find("ogrenci").expect("left column present");
        let right_pos = joined.find("sagogrenci").expect("right column present");
        assert!(left_pos < right_pos);
    }

    #[test]
    fn margin_band_drops_page_furniture() {
        let mut words = body_words(50.0, 300.0);
        words.push(word("7", 300.0, 780.0)); // page number in footer band
        words.push(word("Universite", 50.0, 10.0)); // running header
        let page = page_with_words(words);

        let result = extract_lines(&page).expect("extraction succeeds");
        let joined = result.lines.join(" ");
        assert!(!joined.contains('7'));
        assert!(!joined.contains("Universite"));
    }

    #[test]
    fn margin_band_keeps_dense_prose() {
        let lines = vec![
            Line {
                text: "ogrencinin mazeretli sayilabilmesi icin belgeye dayali basvuru yapmasi gerekir"
                    .to_string(),
                top: Some(10.0),
            },
        ];
        let kept = filter_margin_bands(lines, 792.0);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn empty_page_fails_all_strategies() {
        let page = page_with_words(vec![]);
        assert!(extract_lines(&page).is_none());
    }

    #[test]
    fn cluster_orders_words_within_a_line() {
        let words = [
            word("ikinci", 100.0, 50.0),
            word("birinci", 20.0, 50.5),
            word("alt", 20.0, 70.0),
        ];
        let refs: Vec<&WordBox> = words.iter().collect();
        let lines = cluster_into_lines(&refs);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "birinci ikinci");
        assert_eq!(lines[1].text, "alt");
    }
}
