use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use geo::{Coord, Rect};
use graph_tiles::{
    DirectoryTileSource, GraphId, GraphReader, GraphReaderConfig, GraphTile, TileHierarchy,
    TileLevel, TileSource,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Inspects a directory of graph tiles.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// The tile directory (overrides the config file).
    #[arg(long, env = "GRAPH_TILES_DIR")]
    tile_dir: Option<PathBuf>,
    /// A JSON config file.
    #[arg(long, env = "GRAPH_TILES_CONFIG")]
    config: Option<PathBuf>,
    /// The tile cache budget in megabytes (overrides the config file).
    #[arg(long)]
    cache_size_mb: Option<usize>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lists the tiles covering a bounding box.
    Tiles {
        /// Only list tiles on this level.
        #[arg(long)]
        level: Option<u8>,
        /// `min_lon,min_lat,max_lon,max_lat`; `min_lon > max_lon` crosses the antimeridian.
        #[arg(long, value_parser = parse_bbox)]
        bbox: BoundingBox,
    },
    /// Prints the smallest box covering the nodes in a bounding box and their edges.
    Bbox {
        #[arg(long, value_parser = parse_bbox)]
        bbox: BoundingBox,
    },
    /// Finds the shortcut containing an edge (`level/tile/index`) and expands it.
    Shortcut { edge: GraphId },
    /// Expands every shortcut in the tile set and reports failures.
    VerifyShortcuts {
        /// Only check this level.
        #[arg(long)]
        level: Option<u8>,
    },
}

#[derive(Copy, Clone, Debug)]
struct BoundingBox {
    south_west: Coord<f64>,
    north_east: Coord<f64>,
}

impl BoundingBox {
    fn rect(self) -> Rect<f64> {
        Rect::new(self.south_west, self.north_east)
    }
}

fn parse_bbox(value: &str) -> Result<BoundingBox, String> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("Invalid coordinate: {e}"))?;
    let [min_x, min_y, max_x, max_y] = parts[..] else {
        return Err("Expected min_lon,min_lat,max_lon,max_lat".to_string());
    };
    Ok(BoundingBox {
        south_west: Coord { x: min_x, y: min_y },
        north_east: Coord { x: max_x, y: max_y },
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InspectConfig {
    tile_dir: Option<PathBuf>,
    reader: GraphReaderConfig,
    hierarchy: Option<HierarchyConfig>,
}

#[derive(Debug, Deserialize)]
struct HierarchyConfig {
    levels: Vec<TileLevel>,
    transit: TileLevel,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<InspectConfig> {
    let Some(path) = path else {
        return Ok(InspectConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("Unable to read config file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Unable to parse config file {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let hierarchy = Arc::new(match config.hierarchy {
        Some(HierarchyConfig { levels, transit }) => {
            TileHierarchy::new(levels, transit).context("Invalid tile hierarchy")?
        }
        None => TileHierarchy::standard(),
    });

    if let Command::Tiles { level, bbox } = cli.command {
        return list_tiles(&hierarchy, level, bbox);
    }

    let Some(tile_dir) = cli.tile_dir.or(config.tile_dir) else {
        bail!("No tile directory given (use --tile-dir or the config file)");
    };
    if !tile_dir.is_dir() {
        bail!("{} is not a directory", tile_dir.display());
    }
    let mut reader_config = config.reader;
    if let Some(megabytes) = cli.cache_size_mb {
        reader_config.max_cache_size = megabytes << 20;
    }
    let source = DirectoryTileSource::new(tile_dir, hierarchy.clone());
    let reader = GraphReader::new(source, hierarchy, reader_config);

    match cli.command {
        Command::Tiles { .. } => Ok(()),
        Command::Bbox { bbox } => minimum_bounding_box(&reader, bbox),
        Command::Shortcut { edge } => shortcut(&reader, edge),
        Command::VerifyShortcuts { level } => verify_shortcuts(&reader, level),
    }
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn list_tiles(
    hierarchy: &TileHierarchy,
    level: Option<u8>,
    bbox: BoundingBox,
) -> anyhow::Result<()> {
    let levels: Vec<u8> = match level {
        Some(level) => vec![level],
        None => hierarchy.levels().iter().map(|level| level.level).collect(),
    };

    let mut tiles = Vec::new();
    for level in levels {
        let grid = hierarchy
            .tiles(level)
            .with_context(|| format!("Level {level} is not part of the hierarchy"))?;
        for tile_id in grid.tile_list_between(bbox.south_west, bbox.north_east) {
            let graph_id = GraphId::try_from_components(level, u64::from(tile_id), 0)?;
            tiles.push(json!({
                "graph_id": graph_id.to_string(),
                "path": hierarchy.file_path(graph_id, "gph")?,
            }));
        }
    }
    print_json(&json!(tiles))
}

fn minimum_bounding_box<S: TileSource>(
    reader: &GraphReader<S>,
    bbox: BoundingBox,
) -> anyhow::Result<()> {
    let min_bbox = reader
        .get_minimum_bounding_box(bbox.rect())
        .context("Unable to compute the bounding box")?;
    let value = match min_bbox {
        Some(rect) => json!({
            "min_lon": rect.min().x,
            "min_lat": rect.min().y,
            "max_lon": rect.max().x,
            "max_lat": rect.max().y,
        }),
        None => serde_json::Value::Null,
    };
    print_json(&value)
}

fn shortcut<S: TileSource>(reader: &GraphReader<S>, edge: GraphId) -> anyhow::Result<()> {
    if reader.directed_edge(edge)?.is_none() {
        bail!("Edge {edge} does not exist");
    }
    let Some(shortcut) = reader.get_shortcut(edge)? else {
        return print_json(&json!({ "edge": edge.to_string(), "shortcut": null }));
    };
    let recovered = reader.recover_shortcut(shortcut)?;
    print_json(&json!({
        "edge": edge.to_string(),
        "shortcut": shortcut.to_string(),
        "shape": reader.encoded_edge_shape(shortcut)?,
        "recovered": recovered.iter().map(ToString::to_string).collect::<Vec<_>>(),
    }))
}

fn verify_shortcuts<S: TileSource>(
    reader: &GraphReader<S>,
    level: Option<u8>,
) -> anyhow::Result<()> {
    let hierarchy = reader.hierarchy();
    let tile_ids: Vec<GraphId> = reader
        .source()
        .available_tiles()
        .context("Unable to list tiles")?
        .into_iter()
        .filter(|tile_id| {
            hierarchy.has_shortcuts(tile_id.level())
                && level.is_none_or(|level| tile_id.level() == level)
        })
        .collect();

    tracing::info!(tiles = tile_ids.len(), "Verifying shortcuts");
    let progress_bar = ProgressBar::new(tile_ids.len() as u64);
    progress_bar.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {wide_bar} {pos}/{len} tiles ({eta})")?,
    );

    let (mut shortcuts, mut failed) = (0usize, Vec::new());
    for tile_id in &tile_ids {
        let tile = reader
            .get_graph_tile(*tile_id)
            .with_context(|| format!("Unable to load tile {tile_id}"))?
            .with_context(|| format!("Tile {tile_id} disappeared"))?;
        for (index, edge) in tile.directed_edges().iter().enumerate() {
            if !edge.is_shortcut() {
                continue;
            }
            let shortcut = tile_id.with_index(index as u64)?;
            shortcuts += 1;
            if reader.recover_shortcut(shortcut)? == [shortcut] {
                failed.push(shortcut.to_string());
            }
        }
        progress_bar.inc(1);
    }
    progress_bar.finish_and_clear();

    print_json(&json!({
        "tiles": tile_ids.len(),
        "shortcuts": shortcuts,
        "recovered": shortcuts - failed.len(),
        "failed": failed,
    }))
}
