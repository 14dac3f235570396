mod core;
mod error;
mod markdown;
mod model;
mod normalize;
mod pipeline;
mod readtime;
mod serve;
mod source;

use crate::core::{Config, Context};
use crate::normalize::Defaults;
use crate::pipeline::{Lookup, Pipeline};
use crate::source::Collection;
use anyhow::{Result, bail};
use argh::FromArgs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(FromArgs)]
/// Serve portfolio articles and projects as JSON.
struct Args {
    /// site directory holding `_config.toml` (default: current directory)
    #[argh(option, short = 'd', default = "PathBuf::from(\".\")")]
    dir: PathBuf,

    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Serve(ServeCommand),
    List(ListCommand),
    Show(ShowCommand),
}

#[derive(FromArgs)]
/// Run the HTTP server.
#[argh(subcommand, name = "serve")]
struct ServeCommand {
    /// address to listen on, overriding the config
    #[argh(option)]
    bind: Option<String>,
}

#[derive(FromArgs)]
/// Print a collection's items as JSON.
#[argh(subcommand, name = "list")]
struct ListCommand {
    /// articles (or blogs) or projects
    #[argh(positional)]
    collection: Collection,

    /// compute read times from each item's body
    #[argh(switch)]
    exact: bool,
}

#[derive(FromArgs)]
/// Print one rendered item as JSON.
#[argh(subcommand, name = "show")]
struct ShowCommand {
    /// articles (or blogs) or projects
    #[argh(positional)]
    collection: Collection,

    /// the item's slug
    #[argh(positional)]
    slug: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let args: Args = argh::from_env();
    let config = Config::load(&args.dir)?;
    let mut ctx = Context::new(args.dir, config);

    let defaults = Defaults {
        cover: ctx.config.default_cover.clone(),
        slug_property: ctx.config.notion.slug_property.clone(),
    };
    let pipeline = Pipeline::new(ctx.source()?, defaults, ctx.config.max_document_bytes);

    match args.command {
        Command::Serve(cmd) => {
            if let Some(bind) = cmd.bind {
                ctx.config.bind = bind;
            }
            serve::serve(ctx, pipeline)
        }
        Command::List(cmd) => print_list(&pipeline, cmd.collection, cmd.exact),
        Command::Show(cmd) => show(&pipeline, cmd.collection, &cmd.slug),
    }
}

#[tokio::main]
async fn print_list(pipeline: &Pipeline, collection: Collection, exact: bool) -> Result<()> {
    let items = if exact {
        pipeline.list_with_read_times(collection, 8).await?
    } else {
        pipeline.list(collection).await?
    };
    println!("{}", serde_json::to_string_pretty(&items)?);
    Ok(())
}

#[tokio::main]
async fn show(pipeline: &Pipeline, collection: Collection, slug: &str) -> Result<()> {
    match pipeline.get_one(collection, slug).await? {
        Lookup::Found(doc) => {
            let body = serve::ItemBody::from(*doc);
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
        Lookup::NotFound => bail!("no {collection} item called `{slug}`"),
    }
}
