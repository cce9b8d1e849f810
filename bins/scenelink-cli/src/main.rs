// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! SceneLink CLI
//!
//! Mirrors the render engine's graph over the bridge socket, optionally applies
//! one mutation, and prints the resulting tree.

use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use scenelink_app_core::config::ConfigService;
use scenelink_app_core::prefs::{SyncPrefs, SYNC_PREFS_KEY};
use scenelink_client::RpcClient;
use scenelink_config_fs::FsConfigStore;
use scenelink_proto::{default_socket_path, AttrType, AttrValue, Handle};
use scenelink_sync::{SceneSync, TraversalLimits};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod render;

#[derive(Parser, Debug)]
#[command(author, version, about = "Mirror and edit a remote render graph", long_about = None)]
struct Args {
    /// Bridge socket path (defaults to saved prefs, then $XDG_RUNTIME_DIR/scenelink.sock)
    #[arg(long)]
    endpoint: Option<PathBuf>,
    /// Deepest traversal level
    #[arg(long)]
    max_depth: Option<u32>,
    /// Pause between top-level subtree expansions (ms)
    #[arg(long)]
    sibling_delay_ms: Option<u64>,
    /// Per-call timeout (ms)
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Persist the effective settings as the new defaults
    #[arg(long)]
    save_prefs: bool,
    /// Command to execute
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the mirrored tree
    Tree,
    /// Create a node of the given type in the root graph
    Create {
        /// Remote type tag (geometry, material, camera, ...)
        type_tag: String,
    },
    /// Delete a node and its collapsed inputs
    Delete {
        #[arg(value_parser = parse_handle)]
        handle: Handle,
    },
    /// Feed a pin from another node
    Connect {
        #[arg(value_parser = parse_handle)]
        target: Handle,
        pin: u32,
        #[arg(value_parser = parse_handle)]
        source: Handle,
    },
    /// Clear a pin
    Disconnect {
        #[arg(value_parser = parse_handle)]
        target: Handle,
        pin: u32,
    },
    /// Copy nodes into the root graph
    Copy {
        #[arg(required = true, value_parser = parse_handle)]
        handles: Vec<Handle>,
    },
    /// Move nodes into a new group
    Group {
        #[arg(required = true, value_parser = parse_handle)]
        handles: Vec<Handle>,
    },
    /// Dissolve a group
    Ungroup {
        #[arg(value_parser = parse_handle)]
        handle: Handle,
    },
    /// Print a leaf node's value
    Get {
        #[arg(value_parser = parse_handle)]
        handle: Handle,
    },
    /// Write a leaf node's value (comma separated for vectors)
    Set {
        #[arg(value_parser = parse_handle)]
        handle: Handle,
        value: String,
    },
}

fn parse_handle(raw: &str) -> Result<Handle, String> {
    let digits = raw.strip_prefix('#').unwrap_or(raw);
    let value: u64 = digits
        .parse()
        .map_err(|err| format!("invalid handle {raw:?}: {err}"))?;
    Handle::from_raw(value).ok_or_else(|| "handle must be non-zero".to_string())
}

fn parse_value(attr_type: AttrType, raw: &str) -> Result<AttrValue> {
    fn parts<T: std::str::FromStr, const N: usize>(raw: &str) -> Result<[T; N]>
    where
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        let parsed = raw
            .split(',')
            .map(|part| part.trim().parse::<T>())
            .collect::<Result<Vec<T>, _>>()
            .with_context(|| format!("cannot parse {raw:?}"))?;
        let len = parsed.len();
        parsed
            .try_into()
            .map_err(|_| anyhow::anyhow!("expected {N} components, got {len}"))
    }
    Ok(match attr_type {
        AttrType::Bool => AttrValue::Bool(raw.trim().parse().context("expected true/false")?),
        AttrType::Int => AttrValue::Int(raw.trim().parse().context("expected an integer")?),
        AttrType::Int2 => AttrValue::Int2(parts(raw)?),
        AttrType::Int3 => AttrValue::Int3(parts(raw)?),
        AttrType::Float => AttrValue::Float(raw.trim().parse().context("expected a number")?),
        AttrType::Float2 => AttrValue::Float2(parts(raw)?),
        AttrType::Float3 => AttrValue::Float3(parts(raw)?),
        AttrType::Float4 => AttrValue::Float4(parts(raw)?),
        AttrType::Text => AttrValue::Text(raw.to_string()),
    })
}

/// Saved prefs overlaid with command line flags.
fn effective_prefs(args: &Args) -> SyncPrefs {
    let mut prefs = match FsConfigStore::new() {
        Ok(store) => {
            let (prefs, err) = ConfigService::new(store).load_or_default::<SyncPrefs>(SYNC_PREFS_KEY);
            if let Some(err) = err {
                warn!(%err, "ignoring unreadable prefs");
            }
            prefs
        }
        Err(err) => {
            warn!(%err, "config dir unavailable; using defaults");
            SyncPrefs::default()
        }
    };
    if let Some(endpoint) = &args.endpoint {
        prefs.endpoint = endpoint.display().to_string();
    }
    if let Some(max_depth) = args.max_depth {
        prefs.max_depth = max_depth;
    }
    if let Some(delay) = args.sibling_delay_ms {
        prefs.sibling_delay_ms = delay;
    }
    if args.timeout_ms.is_some() {
        prefs.call_timeout_ms = args.timeout_ms;
    }
    prefs.sanitized()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let args = Args::parse();
    let prefs = effective_prefs(&args);
    if args.save_prefs {
        let store = FsConfigStore::new().context("resolve config dir")?;
        ConfigService::new(store)
            .save(SYNC_PREFS_KEY, &prefs)
            .context("save prefs")?;
        info!("prefs saved");
    }

    let endpoint = if prefs.endpoint.is_empty() {
        default_socket_path()
    } else {
        PathBuf::from(&prefs.endpoint)
    };
    info!(endpoint = %endpoint.display(), max_depth = prefs.max_depth, "connecting");
    let client = RpcClient::connect(&endpoint)
        .await?
        .with_timeout(prefs.call_timeout());
    let limits = TraversalLimits {
        max_depth: prefs.max_depth,
        sibling_delay: prefs.sibling_delay(),
    };
    let mut sync = SceneSync::with_limits(client, limits);
    sync.build_full_tree().await.context("initial build")?;

    let mut out = std::io::stdout().lock();
    match args.cmd {
        Command::Tree => {}
        Command::Create { type_tag } => {
            let handle = sync.create_node(&type_tag).await?;
            writeln!(out, "created {handle}")?;
        }
        Command::Delete { handle } => {
            let deletion = sync.delete_node(handle).await?;
            writeln!(
                out,
                "deleted {handle} (+{} collapsed)",
                deletion.collapsed_children.len()
            )?;
        }
        Command::Connect {
            target,
            pin,
            source,
        } => {
            sync.connect(target, pin, source).await?;
            writeln!(out, "connected {source} -> {target}:{pin}")?;
        }
        Command::Disconnect { target, pin } => {
            sync.disconnect(target, pin).await?;
            writeln!(out, "disconnected {target}:{pin}")?;
        }
        Command::Copy { handles } => {
            let copies = sync.copy_nodes(&handles).await?;
            for copy in copies {
                writeln!(out, "copied {copy}")?;
            }
        }
        Command::Group { handles } => {
            let group = sync.group_nodes(&handles).await?;
            writeln!(out, "grouped into {group}")?;
        }
        Command::Ungroup { handle } => {
            let released = sync.ungroup_node(handle).await?;
            writeln!(out, "released {} item(s)", released.len())?;
        }
        Command::Get { handle } => {
            let value = sync.attribute_value(handle).await?;
            writeln!(out, "{}", render::format_value(&value))?;
            return Ok(());
        }
        Command::Set { handle, value } => {
            let Some(attr) = sync.lookup(handle).and_then(|r| r.value_attribute()) else {
                bail!("{handle} has no editable value");
            };
            let value = parse_value(attr.attr_type, &value)?;
            sync.set_attribute_value(handle, value).await?;
            writeln!(out, "updated {handle}")?;
            return Ok(());
        }
    }
    write!(out, "{}", render::render_tree(sync.scene()))?;
    Ok(())
}
