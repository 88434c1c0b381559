//! Category command

use clap::Args;
use serde::Serialize;

use crate::output::{self, OutputFormat};
use crate::AppContext;

#[derive(Args)]
pub struct CategoryArgs {
    /// Entity kind
    pub kind: String,
}

#[derive(Serialize)]
struct CategoryView {
    kind: String,
    id: String,
    count: usize,
}

pub async fn run(args: &CategoryArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let category = ctx.db.category(&args.kind).await?;
    let view = CategoryView {
        kind: category.kind().label().to_string(),
        id: category.id().to_string(),
        count: category.count().await?,
    };

    ctx.emit(&match ctx.format {
        OutputFormat::Json => output::to_json(&view),
        OutputFormat::Table => format!(
            "{}: {} instance(s) (category node {})",
            view.kind, view.count, view.id
        ),
    });
    Ok(())
}
