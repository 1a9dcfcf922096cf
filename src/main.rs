use anyhow::{bail, Context};
use labres::config::AppConfig;
use labres::{Entity, Equipment, HttpTransport, IdOrName, Lab, Lookup, Scope, Software, WorkUnit};
use log::info;
use serde::Serialize;
use std::sync::Arc;

const USAGE: &str = "usage: labres <labs|equipments|softwares|work-units> [<id-or-name>]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let Some(resource) = args.next() else {
        bail!(USAGE);
    };
    let target = args.next().map(|raw| IdOrName::parse(&raw));

    let config = AppConfig::load()?;
    info!("using backend {}", config.backend.base_url);

    let transport = HttpTransport::new(&config.backend, config.credentials())?;
    let scope = Scope::new(Arc::new(transport));

    match resource.as_str() {
        "labs" => show::<Lab>(&scope, target).await,
        "equipments" => show::<Equipment>(&scope, target).await,
        "softwares" => show::<Software>(&scope, target).await,
        "work-units" => show::<WorkUnit>(&scope, target).await,
        other => bail!("unknown resource '{}'\n{}", other, USAGE),
    }
}

async fn show<E: Entity>(scope: &Scope, target: Option<IdOrName>) -> anyhow::Result<()> {
    let collection = scope.collection::<E>();
    match target {
        Some(IdOrName::Id(id)) => {
            let entity = collection
                .fetch(id)
                .await
                .with_context(|| format!("loading {} {}", E::NAME, id))?;
            print_json(&entity)
        }
        Some(IdOrName::Name(name)) => {
            let matches = collection
                .query(&E::Lookup::by_name(&name))
                .await
                .with_context(|| format!("looking up {} '{}'", E::NAME, name))?;
            info!("{} {} record(s) named '{}'", matches.len(), E::NAME, name);
            print_json(&matches)
        }
        None => {
            let all = collection
                .query(&E::Lookup::default())
                .await
                .with_context(|| format!("listing {}", E::NAME))?;
            info!("{} {} record(s)", all.len(), E::NAME);
            print_json(&all)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
