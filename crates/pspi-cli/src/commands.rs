//! Subcommand handlers.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use pspi_config::Config;
use pspi_host::host::JsonStateStore;
use pspi_host::registry::{CommandKind, CommandList, discovery};
use pspi_host::{Completion, FilterRegistry, FilterRunner, MemoryImage, NativeLoader, PixelFormat};
use tracing::{debug, info};

use crate::cli::RunArgs;
use crate::errors::AppError;

type Runner = FilterRunner<NativeLoader, JsonStateStore>;

/// Loads the module cache and refreshes it against `search_path`.
///
/// An empty search path leaves the cached registry as it is.
fn refresh_registry(config: &Config, search_path: &[PathBuf]) -> Result<FilterRegistry, AppError> {
    let cache = config.module_cache_path();
    let cached = FilterRegistry::load(&cache)?;
    if search_path.is_empty() {
        debug!(modules = cached.len(), "using cached registry");
        return Ok(cached);
    }
    let registry = discovery::scan(search_path, &cached);
    registry.save(&cache)?;
    Ok(registry)
}

fn runner(config: &Config) -> Result<Runner, AppError> {
    let search_path = config.search_path().to_vec();
    let registry = refresh_registry(config, &search_path)?;
    let store = JsonStateStore::new(config.parameters_dir());
    Ok(FilterRunner::new(registry, NativeLoader, store).with_search_path(search_path))
}

pub(crate) fn settings<W: Write>(
    config: &Config,
    directories: Vec<PathBuf>,
    stdout: &mut W,
) -> Result<Completion, AppError> {
    let cache = config.module_cache_path();
    let mut runner = FilterRunner::new(
        FilterRegistry::load(&cache)?,
        NativeLoader,
        JsonStateStore::new(config.parameters_dir()),
    );
    let search_path = if directories.is_empty() {
        config.search_path().to_vec()
    } else {
        directories
    };
    let completion = runner.apply_settings(search_path)?;
    runner.registry().save(&cache)?;
    info!(modules = runner.registry().len(), "search path applied");
    for directory in runner.search_path() {
        writeln!(stdout, "{}", directory.display())?;
    }
    Ok(completion)
}

pub(crate) fn list<W: Write>(config: &Config, stdout: &mut W) -> Result<Completion, AppError> {
    let registry = refresh_registry(config, config.search_path())?;
    let mut commands = CommandList::new();
    registry.install(&mut commands);
    for spec in commands.commands() {
        match spec.kind {
            CommandKind::Filter => writeln!(
                stdout,
                "{}\t{}\t{}",
                spec.name, spec.menu_path, spec.image_types
            )?,
            CommandKind::About => writeln!(stdout, "{}\t{}", spec.name, spec.menu_path)?,
        }
    }
    Ok(Completion::Completed)
}

pub(crate) fn run(config: &Config, args: &RunArgs) -> Result<Completion, AppError> {
    let format = PixelFormat::from(args.format);
    let pixels = fs::read(&args.input).map_err(|source| AppError::ReadImage {
        path: args.input.clone(),
        source,
    })?;
    let mut image = MemoryImage::new(format, args.width, args.height, pixels)?;
    let mut runner = runner(config)?;
    let completion = runner.run_filter(&args.command, args.mode.into(), &mut image)?;
    if completion == Completion::Completed {
        let output = args.output.as_deref().unwrap_or(&args.input);
        write_image(output, &image.into_pixels())?;
    }
    Ok(completion)
}

pub(crate) fn about(config: &Config, command: &str) -> Result<Completion, AppError> {
    let runner = runner(config)?;
    Ok(runner.run_about(command, pspi_host::RunMode::Interactive)?)
}

fn write_image(path: &Path, pixels: &[u8]) -> Result<(), AppError> {
    fs::write(path, pixels).map_err(|source| AppError::WriteImage {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = pixels.len(), "image written");
    Ok(())
}
