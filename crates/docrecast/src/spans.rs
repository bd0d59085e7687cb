use crate::prelude::{println, *};

#[derive(Debug, clap::Parser)]
#[command(name = "spans")]
#[command(about = "Print the span record of one PDF as JSON")]
pub struct App {
    /// Path to the PDF file
    path: std::path::PathBuf,

    /// Fail on fill colors with no RGB equivalent instead of printing them black
    #[arg(long)]
    strict_colors: bool,
}

pub fn run(app: App, _global: crate::Global) -> Result<()> {
    let bytes =
        std::fs::read(&app.path).with_context(|| f!("cannot read {}", app.path.display()))?;
    let policy = if app.strict_colors {
        recast::ColorPolicy::Strict
    } else {
        recast::ColorPolicy::default()
    };
    let record = recast::pipeline::extract_record(&bytes, policy).map_err(|e| eyre!(e))?;
    println!("{}", record.to_json()?);
    Ok(())
}
