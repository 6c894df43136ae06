use clap::Args;
use std::fs;
use std::path::PathBuf;
use veteran_aid::config::{AppConfig, LabelLanguage};
use veteran_aid::error::AppError;
use veteran_aid::workflows::application::{ParsedApplication, PdfRenderer};

#[derive(Args, Debug)]
pub(crate) struct RenderArgs {
    /// Text file in the [TO]/[FROM]/[BODY]/[ATTACHMENTS] format
    #[arg(long)]
    pub(crate) input: PathBuf,
    /// Destination PDF file
    #[arg(long)]
    pub(crate) output: PathBuf,
    /// Heading printed above the letter (defaults to the label title)
    #[arg(long)]
    pub(crate) title: Option<String>,
    /// TrueType font to embed; overrides PDF_FONT_PATH
    #[arg(long)]
    pub(crate) font: Option<PathBuf>,
    /// Label language for fixed captions: en or uk
    #[arg(long, value_parser = parse_labels)]
    pub(crate) labels: Option<LabelLanguage>,
}

fn parse_labels(raw: &str) -> Result<LabelLanguage, String> {
    LabelLanguage::parse(raw).ok_or_else(|| format!("unknown label language '{raw}' (use en or uk)"))
}

pub(crate) fn run_render(args: RenderArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?.renderer;
    if let Some(font) = args.font {
        config.font_path = Some(font);
        config.bold_font_path = None;
    }
    if let Some(labels) = args.labels {
        config.labels = labels;
    }

    let renderer = PdfRenderer::initialize(&config)?;
    let text = fs::read_to_string(&args.input)?;
    let parsed = ParsedApplication::parse(&text);
    if parsed.is_empty() {
        eprintln!(
            "warning: {} contains no recognised sections; rendering an empty letter",
            args.input.display()
        );
    }

    let document = renderer.render_parsed(&parsed, args.title.as_deref());
    fs::write(&args.output, &document.bytes)?;

    println!(
        "Wrote {} ({} page(s), {} bytes)",
        args.output.display(),
        document.page_count,
        document.bytes.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_languages_parse() {
        assert_eq!(parse_labels("uk"), Ok(LabelLanguage::Ukrainian));
        assert_eq!(parse_labels("EN"), Ok(LabelLanguage::English));
        assert!(parse_labels("fr").is_err());
    }
}
