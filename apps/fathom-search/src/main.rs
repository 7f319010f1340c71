use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = fathom_search::Args::parse();

	fathom_search::run(args).await
}
