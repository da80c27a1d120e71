//! Extraction Pipeline (C6): the ordered peel of container layers that turns
//! a dump directory's raw contents into one directory per requested
//! partition.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::archive;
use crate::context::ExtractionContext;
use crate::dump_dir::DumpDir;
use crate::error::{ExtractError, Result};
use crate::filter;
use crate::hooks;
use crate::layout;
use crate::magic;
use crate::metadata::{self, RunManifest};
use crate::partition::{file_to_partition, find_alternates, unslot};
use crate::tools::{self, Invocation};

/// Runs the full pipeline against `source`, returning the acquired dump
/// directory on success. The directory is released per its own lifecycle
/// when the caller drops it.
pub fn run(source: &Path, mut ctx: ExtractionContext) -> Result<DumpDir> {
    let dump_dir = DumpDir::acquire(source, ctx.keep_dump)?;
    let dir = dump_dir.path();

    // Captured before any pruning/refinement mutates `ctx.requested_partitions`,
    // so the run manifest always reflects the caller's original ask even on a
    // resumed run where every partition is pruned away before stage 4.
    let original_requested_partitions = ctx.requested_partitions.clone();

    prune_resumed_partitions(&mut ctx, dir)?;

    // Stage 1: augment context so later stages route correctly.
    if !ctx.extra_partitions.iter().any(|p| p == "super") {
        ctx.extra_partitions.push("super".to_string());
    }
    if !ctx.extra_files.iter().any(|f| f == magic::PAYLOAD_BIN_FILE_NAME) {
        ctx.extra_files.push(magic::PAYLOAD_BIN_FILE_NAME.to_string());
    }

    // Stage 2: unpack the outer archive, if the source was a file.
    if source.is_file() {
        log::info!("stage 2: unpacking outer archive");
        archive::extract_image_file(source, &ctx, dir)?;
    }

    // Stage 3: hooks, pass 1.
    log::info!("stage 3: running extract hooks (pass 1)");
    hooks::run_extract_fns(&ctx, dir)?;

    // Stage 4: payload.bin.
    extract_payload_bin(&ctx, dir)?;

    // Stage 5: sparse raw images.
    extract_sparse_raw_imgs(&ctx, dir)?;

    // Stage 6: super.img.
    extract_super_img(&ctx, dir)?;

    // Stage 7: refine requested_partitions against what's actually present.
    log::info!("stage 7: refining requested partitions");
    let present = filter::scandir_file_names(dir)?;
    ctx.requested_partitions = filter::partitions_present(&ctx.requested_partitions, &present);

    // Stage 8: brotli.
    extract_brotli_imgs(&ctx, dir)?;

    // Stage 9: sparse data merge.
    extract_sparse_data_imgs(&ctx, dir)?;

    // Stage 10: EROFS.
    extract_erofs(&ctx, dir)?;

    // Stage 11: EXT4.
    extract_ext4(&ctx, dir)?;

    // Stage 12: hooks, pass 2.
    log::info!("stage 12: running extract hooks (pass 2)");
    hooks::run_extract_fns(&ctx, dir)?;

    // Stage 13: layout normalization.
    log::info!("stage 13: normalizing layout");
    layout::move_sar_system_paths(dir)?;
    layout::move_alternate_partition_paths(dir)?;

    // Stage 14: stub any partition that still lacks a directory.
    let stub_partitions = stub_missing_partitions(&ctx, dir)?;

    write_run_manifest(source, &original_requested_partitions, dir, &stub_partitions);

    Ok(dump_dir)
}

/// C4's resume contract: drop any requested partition whose directory is
/// already present, so a repeated run on the same persistent dump dir skips
/// completed work. A partition slot occupied by a non-directory is a
/// configuration error, not something to silently skip or retry.
fn prune_resumed_partitions(ctx: &mut ExtractionContext, dump_dir: &Path) -> Result<()> {
    let mut remaining = Vec::with_capacity(ctx.requested_partitions.len());

    for partition in ctx.requested_partitions.drain(..) {
        let path = dump_dir.join(&partition);
        if path.is_dir() {
            continue;
        }
        if path.exists() {
            return Err(ExtractError::UnexpectedFileType(path));
        }
        remaining.push(partition);
    }

    ctx.requested_partitions = remaining;
    Ok(())
}

fn extract_payload_bin(ctx: &ExtractionContext, dump_dir: &Path) -> Result<()> {
    let candidates = magic::find_payload_paths(dump_dir)?;
    let Some(payload_path) = candidates.into_iter().next() else {
        return Ok(());
    };

    log::info!("stage 4: extracting payload.bin");

    let mut wanted: Vec<String> = ctx
        .requested_partitions
        .iter()
        .chain(&ctx.firmware_partitions)
        .cloned()
        .collect();
    loop {
        if wanted.is_empty() {
            break;
        }

        let invocations = wanted
            .iter()
            .map(|partition| {
                Invocation::new(
                    partition.clone(),
                    vec![
                        tools::OTA_EXTRACTOR.to_string(),
                        "--payload".to_string(),
                        payload_path.to_string_lossy().into_owned(),
                        "--output-dir".to_string(),
                        dump_dir.to_string_lossy().into_owned(),
                        "--partitions".to_string(),
                        partition.clone(),
                    ],
                )
            })
            .collect();

        let outcome = tools::run_parallel(invocations, false)?;

        let found: HashSet<String> = outcome.succeeded.iter().cloned().collect();
        for (label, _code, stderr) in &outcome.failed {
            log::debug!("payload probe miss for {label}: {stderr}");
        }

        let next = find_alternates(&wanted, &found);
        if next.is_empty() {
            break;
        }
        wanted = next;
    }

    std::fs::remove_file(&payload_path)?;
    Ok(())
}

struct ChunkSet {
    partition: String,
    chunks: Vec<(u32, PathBuf)>,
}

fn extract_sparse_raw_imgs(ctx: &ExtractionContext, dump_dir: &Path) -> Result<()> {
    let mut partitions = ctx.requested_partitions.clone();
    partitions.push("super".to_string());

    let candidates = magic::find_sparse_raw_paths(&partitions, dump_dir)?;
    if candidates.is_empty() {
        return Ok(());
    }

    log::info!("stage 5: converting sparse raw images");

    let mut groups: HashMap<String, Vec<(u32, PathBuf)>> = HashMap::new();

    for path in candidates {
        let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
        let partition = file_to_partition(&file_name).to_string();

        let index = if file_name.contains(magic::SPARSE_CHUNK_SUFFIX) {
            magic::chunk_index(&file_name).unwrap_or(0)
        } else {
            // Unchunked single file: conceptually renamed to
            // `<file>_sparsechunk.0` so it joins the same code path.
            0
        };

        groups.entry(partition).or_default().push((index, path));
    }

    let chunk_sets: Vec<ChunkSet> = groups
        .into_iter()
        .map(|(partition, mut chunks)| {
            chunks.sort_by_key(|(index, _)| *index);
            ChunkSet { partition, chunks }
        })
        .collect();

    let mut invocations = Vec::new();
    let mut all_inputs = Vec::new();

    for set in &chunk_sets {
        let output_path = dump_dir.join(&set.partition);
        let mut argv = vec![tools::SIMG2IMG.to_string()];
        for (_, chunk) in &set.chunks {
            argv.push(chunk.to_string_lossy().into_owned());
            all_inputs.push(chunk.clone());
        }
        argv.push(output_path.to_string_lossy().into_owned());

        invocations.push(Invocation::new(set.partition.clone(), argv));
    }

    tools::run_parallel(invocations, true)?;

    for input in all_inputs {
        std::fs::remove_file(input)?;
    }

    Ok(())
}

/// Given the set of slot candidates lpunpack successfully unpacked, checks
/// that no partition succeeded under more than one distinct slot candidate
/// and, only once that holds for the whole batch, returns the set of found
/// partitions plus the `(slotted_file_name, unslotted_file_name)` renames to
/// perform. Pure and side-effect-free so the duplicate-slot invariant can be
/// validated before any filesystem mutation happens.
fn resolve_super_img_successes(
    succeeded: &[String],
    label_to_candidate: &HashMap<String, (String, String)>,
) -> Result<(HashSet<String>, Vec<(String, String)>)> {
    let mut unslotted_succeeded: HashMap<String, String> = HashMap::new();
    let mut found: HashSet<String> = HashSet::new();

    for label in succeeded {
        let (partition, candidate) = &label_to_candidate[label];

        if let Some(prior) = unslotted_succeeded.insert(partition.clone(), candidate.clone()) {
            if prior != *candidate {
                return Err(ExtractError::DuplicateSlot(partition.clone()));
            }
        }

        found.insert(partition.clone());
    }

    let renames = succeeded
        .iter()
        .map(|label| {
            let (_partition, candidate) = &label_to_candidate[label];
            (format!("{candidate}.img"), format!("{}.img", unslot(candidate)))
        })
        .collect();

    Ok((found, renames))
}

fn extract_super_img(ctx: &ExtractionContext, dump_dir: &Path) -> Result<()> {
    let candidates = magic::find_super_img_paths(dump_dir)?;
    let Some(super_path) = candidates.into_iter().next() else {
        return Ok(());
    };

    log::info!("stage 6: unpacking super.img");

    let mut wanted = ctx.requested_partitions.clone();

    loop {
        if wanted.is_empty() {
            break;
        }

        let slot_suffixes = ["", "_a"];
        let mut invocations = Vec::new();
        let mut label_to_candidate: HashMap<String, (String, String)> = HashMap::new();

        for partition in &wanted {
            for suffix in slot_suffixes {
                let candidate = format!("{partition}{suffix}");
                let label = format!("{partition}{suffix}");
                label_to_candidate.insert(label.clone(), (partition.clone(), candidate.clone()));
                invocations.push(Invocation::new(
                    label,
                    vec![
                        tools::LPUNPACK.to_string(),
                        "--partition".to_string(),
                        candidate,
                        super_path.to_string_lossy().into_owned(),
                        dump_dir.to_string_lossy().into_owned(),
                    ],
                ));
            }
        }

        let outcome = tools::run_parallel(invocations, false)?;

        // Validate that every partition succeeded under at most one slot
        // candidate *before* performing any rename. Renaming as successes
        // are discovered would let a later duplicate silently clobber the
        // first candidate's already-placed image before the error is
        // raised; the invariant violation must be surfaced untouched.
        let (found, renames) = resolve_super_img_successes(&outcome.succeeded, &label_to_candidate)?;

        for (slotted_path, produced_path) in renames {
            let slotted_path = dump_dir.join(slotted_path);
            let produced_path = dump_dir.join(produced_path);
            if slotted_path != produced_path && slotted_path.exists() {
                std::fs::rename(&slotted_path, &produced_path)?;
            }
        }

        for (label, _code, stderr) in &outcome.failed {
            log::debug!("lpunpack probe miss for {label}: {stderr}");
        }

        let next = find_alternates(&wanted, &found);
        if next.is_empty() {
            break;
        }
        wanted = next;
    }

    std::fs::remove_file(&super_path)?;
    Ok(())
}

fn extract_brotli_imgs(ctx: &ExtractionContext, dump_dir: &Path) -> Result<()> {
    let candidates = magic::find_brotli_paths(&ctx.requested_partitions, dump_dir)?;
    if candidates.is_empty() {
        return Ok(());
    }

    log::info!("stage 8: decompressing brotli-wrapped sparse data");

    let mut invocations = Vec::new();
    for path in &candidates {
        let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
        let output_name = file_name.strip_suffix(".br").unwrap_or(&file_name).to_string();
        let output_path = dump_dir.join(output_name);

        invocations.push(Invocation::new(
            file_to_partition(&file_name).to_string(),
            vec![
                tools::BROTLI.to_string(),
                "-d".to_string(),
                path.to_string_lossy().into_owned(),
                "-o".to_string(),
                output_path.to_string_lossy().into_owned(),
            ],
        ));
    }

    tools::run_parallel(invocations, true)?;

    for path in candidates {
        std::fs::remove_file(path)?;
    }

    Ok(())
}

fn extract_sparse_data_imgs(ctx: &ExtractionContext, dump_dir: &Path) -> Result<()> {
    let candidates = magic::find_sparse_data_paths(&ctx.requested_partitions, dump_dir)?;
    if candidates.is_empty() {
        return Ok(());
    }

    log::info!("stage 9: merging sparse data into raw images");

    let mut invocations = Vec::new();
    let mut inputs = Vec::new();

    for path in &candidates {
        let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
        let Some(stem) = file_name.strip_suffix(magic::SPARSE_DATA_EXT) else {
            continue;
        };

        let transfer_list = path.with_file_name(format!("{stem}{}", magic::TRANSFER_LIST_EXT));
        if !transfer_list.is_file() {
            continue;
        }

        let output_path = dump_dir.join(stem);

        invocations.push(Invocation::new(
            stem.to_string(),
            vec![
                tools::SDAT2IMG.to_string(),
                transfer_list.to_string_lossy().into_owned(),
                path.to_string_lossy().into_owned(),
                output_path.to_string_lossy().into_owned(),
            ],
        ));

        inputs.push(path.clone());
        inputs.push(transfer_list);
    }

    tools::run_parallel(invocations, true)?;

    for input in inputs {
        if input.exists() {
            std::fs::remove_file(input)?;
        }
    }

    Ok(())
}

fn extract_erofs(ctx: &ExtractionContext, dump_dir: &Path) -> Result<()> {
    let candidates = magic::find_erofs_paths(&ctx.requested_partitions, dump_dir)?;
    if candidates.is_empty() {
        return Ok(());
    }

    log::info!("stage 10: extracting EROFS images");
    extract_filesystem_images(dump_dir, candidates, |partition_dir, path| {
        vec![
            tools::FSCK_EROFS.to_string(),
            format!("--extract={}", partition_dir.display()),
            path.to_string_lossy().into_owned(),
        ]
    })
}

fn extract_ext4(ctx: &ExtractionContext, dump_dir: &Path) -> Result<()> {
    let candidates = magic::find_ext4_paths(&ctx.requested_partitions, dump_dir)?;
    if candidates.is_empty() {
        return Ok(());
    }

    log::info!("stage 11: extracting EXT4 images");
    extract_filesystem_images(dump_dir, candidates, |partition_dir, path| {
        vec![
            tools::DEBUGFS.to_string(),
            "-R".to_string(),
            format!("rdump / {}", partition_dir.display()),
            path.to_string_lossy().into_owned(),
        ]
    })
}

fn extract_filesystem_images(
    dump_dir: &Path,
    candidates: Vec<PathBuf>,
    argv_for: impl Fn(&Path, &Path) -> Vec<String>,
) -> Result<()> {
    let mut invocations = Vec::new();
    let mut inputs = Vec::new();

    for path in &candidates {
        let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
        let stem = file_name.rsplit_once('.').map(|(s, _)| s).unwrap_or(&file_name);
        let partition_dir = dump_dir.join(stem);
        std::fs::create_dir_all(&partition_dir)?;

        invocations.push(Invocation::new(stem.to_string(), argv_for(&partition_dir, path)));
        inputs.push(path.clone());
    }

    tools::run_parallel(invocations, true)?;

    for input in inputs {
        std::fs::remove_file(input)?;
    }

    Ok(())
}

fn stub_missing_partitions(ctx: &ExtractionContext, dump_dir: &Path) -> Result<Vec<String>> {
    let mut stubs = Vec::new();

    for partition in &ctx.requested_partitions {
        let partition_dir = dump_dir.join(partition);
        if partition_dir.is_dir() {
            continue;
        }

        log::warn!("partition `{partition}` was never produced, stubbing empty directory");
        std::fs::create_dir_all(&partition_dir)?;
        stubs.push(partition.clone());
    }

    Ok(stubs)
}

fn write_run_manifest(
    source: &Path,
    requested_partitions: &[String],
    dump_dir: &Path,
    stub_partitions: &[String],
) {
    let source_sha1 = if source.is_file() {
        metadata::sha1_file(source).unwrap_or_default()
    } else {
        String::new()
    };

    // Derived from the caller's original request plus the dump dir's actual
    // state, not from `ctx.requested_partitions` — that list has already
    // been pruned/refined by the time this runs, which on a resumed run
    // would otherwise leave this empty even though every partition exists.
    let produced_partitions: Vec<String> = requested_partitions
        .iter()
        .filter(|p| !stub_partitions.contains(p) && dump_dir.join(p).is_dir())
        .cloned()
        .collect();

    let manifest = RunManifest {
        source: source.to_path_buf(),
        source_sha1,
        requested_partitions: requested_partitions.to_vec(),
        produced_partitions,
        stub_partitions: stub_partitions.to_vec(),
    };

    if let Err(err) = metadata::write_manifest(dump_dir, &manifest) {
        log::warn!("failed to write run manifest: {err}");
    }
}
