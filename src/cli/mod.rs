use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "vinyl-custodian", about = "Album auto-tagging service: matches local music folders against MusicBrainz and writes back confirmed tags.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the Watcher/Work Queue/façade server (the normal long-running mode).
    Serve,

    /// One-shot library scan: reconcile every folder under the configured
    /// music path, enqueue anything new or changed, then exit without
    /// starting the Watcher or the façade.
    Scan {
        #[arg(long)]
        force: bool,
    },

    /// Validate configuration and database connectivity, then exit. Useful
    /// for a pre-flight check in a deploy pipeline.
    DryStart,

    /// Re-tag a single already-indexed album by id, optionally pinning a
    /// specific MusicBrainz release instead of letting the Matcher search.
    Retag {
        album_id: String,

        #[arg(long)]
        release_id: Option<String>,
    },

    /// Restore an album's most recent tag backup.
    Restore { album_id: String },
}
