use std::path::PathBuf;

use clap::{Parser, Subcommand};

use pdfsnip::pdf::Rect;

/// Select regions of PDF pages and export them at native resolution.
#[derive(Debug, Parser)]
#[command(name = "pdfsnip", about, version)]
pub struct Cli {
    /// Settings file (default: the per-user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Also write a debug log to this file
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Verbose terminal logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show document metadata and first-page geometry
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report the native extraction scale of pages
    Estimate {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Page range (e.g. '1,3-5'). Default: all pages
        #[arg(long)]
        pages: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Predict the output of one crop without rendering it
    Preview {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// 1-based page number
        #[arg(long)]
        page: usize,

        /// Crop rectangle as L,T,R,B (points, or display pixels with --display)
        #[arg(long, value_parser = parse_rect)]
        rect: Rect,

        /// View zoom the display rectangle was drawn at
        #[arg(long, default_value_t = 1.0)]
        zoom: f32,

        /// Interpret --rect in display pixels at --zoom
        #[arg(long)]
        display: bool,

        /// Also render a thumbnail of the crop to this PNG
        #[arg(long, value_name = "PATH")]
        thumbnail: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Export crops as images
    Extract {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Crop as P:L,T,R,B with a 1-based page and page points; repeatable
        #[arg(long = "crop", value_name = "P:L,T,R,B", value_parser = parse_crop, required = true)]
        crops: Vec<CropArg>,

        #[arg(long, default_value = ".")]
        out_dir: PathBuf,

        /// File name pattern, e.g. 'figure_{n:03}' or '{doc}_{n}'
        #[arg(long)]
        pattern: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Write every embedded image object to disk
    DumpImages {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
}

/// `--crop` value: 0-based page and page-space rectangle
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CropArg {
    pub page: usize,
    pub rect: Rect,
}

pub fn parse_rect(input: &str) -> Result<Rect, String> {
    let values: Vec<f32> = input
        .split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<f32>()
                .map_err(|_| format!("invalid coordinate: '{part}'"))
        })
        .collect::<Result<_, _>>()?;

    match values.as_slice() {
        [left, top, right, bottom] if values.iter().all(|v| v.is_finite()) => {
            Ok(Rect::from_corners(*left, *top, *right, *bottom))
        }
        [_, _, _, _] => Err("coordinates must be finite".to_string()),
        _ => Err(format!(
            "expected 4 comma-separated values (L,T,R,B), got {}",
            values.len()
        )),
    }
}

pub fn parse_crop(input: &str) -> Result<CropArg, String> {
    let (page, rect) = input
        .split_once(':')
        .ok_or_else(|| format!("expected P:L,T,R,B, got '{input}'"))?;
    let page: usize = page
        .trim()
        .parse()
        .map_err(|_| format!("invalid page number: '{page}'"))?;
    if page == 0 {
        return Err("page 0 is invalid (pages start at 1)".to_string());
    }
    Ok(CropArg {
        page: page - 1,
        rect: parse_rect(rect)?,
    })
}

/// Parse a page range string like "1,3-5" into sorted 0-indexed pages
pub fn parse_page_range(input: &str, page_count: usize) -> Result<Vec<usize>, String> {
    let parse = |s: &str| -> Result<usize, String> {
        let page: usize = s
            .trim()
            .parse()
            .map_err(|_| format!("invalid page number: '{s}'"))?;
        if page == 0 {
            return Err("page 0 is invalid (pages start at 1)".to_string());
        }
        if page > page_count {
            return Err(format!(
                "page {page} exceeds document page count ({page_count})"
            ));
        }
        Ok(page)
    };

    let mut pages = Vec::new();
    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((start, end)) = part.split_once('-') {
            let (start, end) = (parse(start)?, parse(end)?);
            if start > end {
                return Err(format!("invalid page range '{part}': start is after end"));
            }
            pages.extend((start..=end).map(|p| p - 1));
        } else {
            pages.push(parse(part)? - 1);
        }
    }

    pages.sort_unstable();
    pages.dedup();
    Ok(pages)
}
