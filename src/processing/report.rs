//! Static HTML, JSON and CSV output of the matcher.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use minijinja::{AutoEscape, Environment, context};
use serde::Serialize;
use thiserror::Error;

use crate::domain::matching::MatchItem;

/// Files copied next to the pages when present in the asset directory.
const ASSETS: [&str; 2] = ["styles.css", "script.js"];
const CSV_HEADER: [&str; 4] = ["object_number", "image1", "image2", "similarity"];

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
    #[error("template {path}: {source}")]
    Template {
        path: String,
        source: minijinja::Error,
    },
    #[error("failed to write JSON export: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write CSV export: {0}")]
    Csv(#[from] csv::Error),
}

pub type ReportResult<T> = Result<T, ReportError>;

/// Where the templates and static assets are read from.
#[derive(Clone, Debug)]
pub struct ReportTemplates {
    pub page: PathBuf,
    /// Optional landing page; skipped when the file does not exist.
    pub index: PathBuf,
    pub asset_dir: PathBuf,
}

/// One report page: every item sharing an object-number base.
#[derive(Debug)]
pub struct GroupPage<'a> {
    pub base: &'a str,
    pub safe_base: String,
    /// 1-based position in the sorted sequence of bases.
    pub number: usize,
    pub prev_base: Option<String>,
    pub next_base: Option<String>,
    pub items: Vec<&'a MatchItem>,
}

/// Files produced by [`write_report`].
#[derive(Debug, Default)]
pub struct ReportOutput {
    pub pages: Vec<PathBuf>,
    pub index: Option<PathBuf>,
    pub json: PathBuf,
    pub csv: PathBuf,
}

/// Makes a base usable inside a file name.
pub fn safe_base(base: &str) -> String {
    base.replace(['/', '\\'], "_")
}

/// Groups items by base in sorted order and links each page to its
/// neighbours. The first page has no previous page, the last no next.
pub fn group_pages(items: &[MatchItem]) -> Vec<GroupPage<'_>> {
    let mut groups: BTreeMap<&str, Vec<&MatchItem>> = BTreeMap::new();
    for item in items {
        groups.entry(item.obj_num_base.as_str()).or_default().push(item);
    }

    let bases: Vec<&str> = groups.keys().copied().collect();
    groups
        .into_iter()
        .enumerate()
        .map(|(i, (base, items))| GroupPage {
            base,
            safe_base: safe_base(base),
            number: i + 1,
            prev_base: i.checked_sub(1).map(|prev| safe_base(bases[prev])),
            next_base: bases.get(i + 1).map(|next| safe_base(next)),
            items,
        })
        .collect()
}

/// JSON for embedding in an inline `<script>`; `<` is escaped so no value
/// can close the element.
pub fn script_json<T: Serialize + ?Sized>(value: &T) -> ReportResult<String> {
    Ok(serde_json::to_string(value)?.replace('<', "\\u003c"))
}

fn read_template(path: &Path) -> ReportResult<String> {
    Ok(fs::read_to_string(path)?)
}

fn template_error(path: &Path) -> impl FnOnce(minijinja::Error) -> ReportError + '_ {
    move |source| ReportError::Template {
        path: path.display().to_string(),
        source,
    }
}

/// Writes the grouped pages, the optional landing page and both exports into
/// `dir`, which is created when missing.
pub fn write_report(
    dir: &Path,
    html_name: &str,
    items: &[MatchItem],
    templates: &ReportTemplates,
) -> ReportResult<ReportOutput> {
    fs::create_dir_all(dir)?;
    log::info!("Writing report to {}", dir.display());

    for asset in ASSETS {
        let source = templates.asset_dir.join(asset);
        if source.exists() {
            fs::copy(&source, dir.join(asset))?;
            log::info!("Copied {asset} to {}", dir.display());
        }
    }

    let pages = group_pages(items);
    let all_bases: Vec<String> = pages.iter().map(|page| page.base.to_string()).collect();
    let all_bases_json = script_json(&all_bases)?;
    let first_base = pages.first().map(|page| page.safe_base.clone());
    let last_base = pages.last().map(|page| page.safe_base.clone());
    let generated_at = chrono::Local::now().format("%Y-%m-%d %H:%M").to_string();

    let mut env = Environment::new();
    env.set_auto_escape_callback(|_| AutoEscape::Html);
    let mut output = ReportOutput::default();

    if !pages.is_empty() {
        let source = read_template(&templates.page)?;
        let template = env
            .template_from_str(&source)
            .map_err(template_error(&templates.page))?;

        log::info!("Generating HTML files for {} unique object bases", pages.len());
        for page in &pages {
            let html = template
                .render(context! {
                    items => &page.items,
                    current_page => page.number,
                    total_pages => pages.len(),
                    total_items => items.len(),
                    html_name => html_name,
                    current_base => page.base,
                    first_base => &first_base,
                    last_base => &last_base,
                    prev_base => &page.prev_base,
                    next_base => &page.next_base,
                    all_bases => &all_bases,
                    all_bases_json => &all_bases_json,
                    generated_at => &generated_at,
                })
                .map_err(template_error(&templates.page))?;

            let path = dir.join(format!("{html_name}_{}.html", page.safe_base));
            fs::write(&path, html)?;
            if page.number % 50 == 0 {
                log::info!("Written {}/{}: {}", page.number, pages.len(), path.display());
            }
            output.pages.push(path);
        }
    }

    if templates.index.exists() {
        let source = read_template(&templates.index)?;
        let html = env
            .template_from_str(&source)
            .and_then(|template| {
                template.render(context! {
                    html_name => html_name,
                    first_base => &first_base,
                    total_groups => pages.len(),
                    all_bases => &all_bases,
                    all_bases_json => &all_bases_json,
                    generated_at => &generated_at,
                })
            })
            .map_err(template_error(&templates.index))?;
        let path = dir.join("index.html");
        fs::write(&path, html)?;
        log::info!("Index page written: {}", path.display());
        output.index = Some(path);
    } else {
        log::warn!(
            "Index template {} not found, skipping index page",
            templates.index.display()
        );
    }

    output.json = dir.join(format!("{html_name}_matches.json"));
    fs::write(&output.json, serde_json::to_vec(items)?)?;

    output.csv = dir.join(format!("{html_name}_matches.csv"));
    let mut writer = csv::Writer::from_path(&output.csv)?;
    writer.write_record(CSV_HEADER)?;
    for item in items {
        for m in &item.matches {
            writer.write_record([
                item.object_number.as_str(),
                item.source_filename.as_str(),
                m.filename.as_str(),
                m.similarity.to_string().as_str(),
            ])?;
        }
    }
    writer.flush()?;

    Ok(output)
}
