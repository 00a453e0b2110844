// bases/fetch_cli/src/output.rs
use audio_tags::TrackTags;
use job_engine::BatchSummary;
use progress_feed::{Phase, ProgressEvent};
use std::path::Path;

#[derive(Clone)]
pub struct OutputHandler {
    verbose: bool,
}

impl OutputHandler {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn print_start(&self, url: &str) {
        println!("Starting download from: {}", url);
    }

    pub fn print_event(&self, event: &ProgressEvent) {
        match event.phase {
            Phase::Downloading | Phase::Processing => {
                match &event.message {
                    Some(message) => println!("{:>5.1}%  {}", event.percent, message),
                    None => println!("{:>5.1}%", event.percent),
                }
            }
            Phase::Error => {
                eprintln!("error: {}", event.message.as_deref().unwrap_or("unknown"));
            }
            Phase::FileStart | Phase::FileChunk | Phase::FileComplete => {
                if self.verbose {
                    println!("transfer {:?}: {:.1}%", event.phase, event.percent);
                }
            }
        }
    }

    pub fn print_complete(&self, path: &Path, tags: &TrackTags) {
        println!("Downloaded: {} to {}", tags.title, path.display());
        println!("Artist: {}", tags.artist);
        if !tags.album.is_empty() {
            println!("Album: {}", tags.album);
        }
    }

    pub fn print_batch_complete(&self, path: &Path, summary: &BatchSummary) {
        println!(
            "Archived {} of {} items to {} ({} failed)",
            summary.archived,
            summary.total,
            path.display(),
            summary.failed
        );
    }

    pub fn print_error(&self, error: &color_eyre::Report) {
        eprintln!("Error: {}", error);

        if self.verbose {
            eprintln!("\nError details:");
            error.chain().skip(1).for_each(|cause| {
                eprintln!("  caused by: {}", cause);
            });
        }
    }
}
