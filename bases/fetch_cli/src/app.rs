// bases/fetch_cli/src/app.rs
use crate::args::Args;
use crate::output::OutputHandler;
use color_eyre::Result;
use delivery_stream::{DeliveryChannel, Frame};
use job_engine::{BatchCoordinator, BatchOverrides, CoverSource, JobEngine, JobRequest};
use media_probe::YtDlp;
use std::sync::Arc;
use temp_store::TempStore;
use tokio::io::AsyncWriteExt;
use url::Url;
use uuid::Uuid;

pub struct App {
    args: Args,
    output: OutputHandler,
}

impl App {
    pub fn new(args: Args) -> Self {
        let output = OutputHandler::new(args.verbose);
        Self { args, output }
    }

    pub async fn run(&self) -> Result<()> {
        let url = Url::parse(&self.args.url)?;
        let tools = media_probe::locate_tools(&self.args.bin_dir)?;

        tokio::fs::create_dir_all(&self.args.output_dir).await?;
        let store = TempStore::open(self.args.output_dir.join(".scratch"));
        let source = Arc::new(YtDlp::new(tools.extractor.clone()));
        let engine = JobEngine::new(store.clone(), tools, source);

        self.output.print_start(url.as_str());
        if self.args.playlist {
            self.run_playlist(engine, url).await
        } else {
            self.run_single(engine, store, url).await
        }
    }

    async fn run_single(&self, engine: JobEngine, store: TempStore, url: Url) -> Result<()> {
        let request = JobRequest {
            url,
            title: self.args.title.clone(),
            artist: self.args.artist.clone(),
            album: self.args.album.clone(),
            cover: CoverSource::None,
        };

        let (channel, mut rx) = DeliveryChannel::pair();
        let printer = {
            let output = self.output.clone();
            tokio::spawn(async move {
                while let Some(frame) = rx.recv().await {
                    if let Frame::Event(event) = frame {
                        output.print_event(&event);
                    }
                }
            })
        };

        let finished = engine.run_job(Uuid::new_v4(), request, &channel).await?;
        drop(channel);
        printer.await?;

        // Take ownership of the artifact out of the scratch directory.
        let dest = self.args.output_dir.join(format!(
            "{}.mp3",
            sanitize_filename::sanitize(&finished.tags.title)
        ));
        tokio::fs::copy(&finished.path, &dest).await?;
        store.delete(&finished.path).await;

        self.output.print_complete(&dest, &finished.tags);
        Ok(())
    }

    async fn run_playlist(&self, engine: JobEngine, url: Url) -> Result<()> {
        let dest = self.args.output_dir.join("playlist.zip");

        let (channel, mut rx) = DeliveryChannel::pair();
        let writer = {
            let output = self.output.clone();
            let dest = dest.clone();
            tokio::spawn(async move {
                let mut file = tokio::fs::File::create(&dest).await?;
                while let Some(frame) = rx.recv().await {
                    match frame {
                        Frame::Event(event) => output.print_event(&event),
                        Frame::Data(data) => file.write_all(&data).await?,
                    }
                }
                file.flush().await?;
                Ok::<(), std::io::Error>(())
            })
        };

        let overrides = BatchOverrides {
            artist: self.args.artist.clone(),
            album: self.args.album.clone(),
            cover: CoverSource::None,
        };
        let coordinator = BatchCoordinator::from_engine(engine);
        let summary = coordinator
            .run_batch(Uuid::new_v4(), &url, overrides, &channel)
            .await?;
        drop(channel);
        writer.await??;

        self.output.print_batch_complete(&dest, &summary);
        Ok(())
    }

    pub fn print_error(&self, error: &color_eyre::Report) {
        self.output.print_error(error);
    }
}
