use clap::Parser;

#[derive(Parser)]
#[command(name = "docscrawl", about = "Documentation-website crawler")]
pub struct Cli {
    /// Seed URL to start crawling from
    pub seed: String,

    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Concurrent render+extract pipelines
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Hard cap on page records emitted
    #[arg(long)]
    pub max_pages: Option<u64>,

    /// BFS depth cap
    #[arg(long)]
    pub max_depth: Option<u32>,

    /// auto | static-only | browser-only
    #[arg(long)]
    pub render_mode: Option<String>,
}
