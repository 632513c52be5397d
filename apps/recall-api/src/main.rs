use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = recall_api::Args::parse();
	recall_api::run(args).await
}
