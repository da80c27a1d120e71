//! Archive Unpacker (C5): streams selected members of an outer ZIP or TAR
//! archive into the dump directory, flattening paths to basenames.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;

use crate::context::ExtractionContext;
use crate::error::{ExtractError, Result};
use crate::filter::filter_file_names;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
}

fn archive_kind(source: &Path) -> Result<ArchiveKind> {
    let name = source.to_string_lossy();
    if name.ends_with(".zip") {
        Ok(ArchiveKind::Zip)
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Ok(ArchiveKind::TarGz)
    } else if name.ends_with(".tar") {
        Ok(ArchiveKind::Tar)
    } else {
        Err(ExtractError::UnknownArchiveType(source.to_path_buf()))
    }
}

/// Extracts the members of `source` selected by `ctx`'s filters into
/// `dump_dir`, writing each as its basename (directory components of the
/// in-archive path are dropped).
pub fn extract_image_file(source: &Path, ctx: &ExtractionContext, dump_dir: &Path) -> Result<()> {
    log::info!("extracting file {}", source.display());

    match archive_kind(source)? {
        ArchiveKind::Zip => extract_zip(source, ctx, dump_dir),
        ArchiveKind::Tar => extract_tar(source, ctx, dump_dir, false),
        ArchiveKind::TarGz => extract_tar(source, ctx, dump_dir, true),
    }
}

fn select_members(ctx: &ExtractionContext, all_names: &[String]) -> Vec<String> {
    if ctx.extract_all {
        return all_names.to_vec();
    }

    filter_file_names(
        &ctx.combined_partitions(),
        &ctx.combined_files(),
        &ctx.extract_fns,
        all_names,
    )
}

fn extract_zip(source: &Path, ctx: &ExtractionContext, dump_dir: &Path) -> Result<()> {
    let file = File::open(source)?;
    let mut archive = zip::ZipArchive::new(file)?;

    let all_basenames: Vec<String> = (0..archive.len())
        .map(|i| {
            archive.by_index(i).map(|f| {
                Path::new(f.name())
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| f.name().to_string())
            })
        })
        .collect::<std::result::Result<_, _>>()?;

    let selected = select_members(ctx, &all_basenames);
    let selected_indices: Vec<usize> = all_basenames
        .iter()
        .enumerate()
        .filter(|(_, name)| selected.contains(name))
        .map(|(i, _)| i)
        .collect();

    // Member copies are independent I/O; run them concurrently and join
    // before the caller observes dump_dir, matching the External Tool
    // Runner's own fan-out/join shape (C2).
    std::thread::scope(|scope| -> Result<()> {
        let mut handles = Vec::new();

        for index in selected_indices {
            let source = source.to_path_buf();
            let dump_dir = dump_dir.to_path_buf();

            handles.push(scope.spawn(move || -> Result<()> {
                let file = File::open(&source)?;
                let mut archive = zip::ZipArchive::new(file)?;
                let mut entry = archive.by_index(index)?;

                let basename = Path::new(entry.name())
                    .file_name()
                    .map(|n| n.to_os_string())
                    .unwrap_or_default();
                let output_path = dump_dir.join(&basename);

                log::debug!("extracting {}", entry.name());

                let mut out = File::create(&output_path)?;
                io::copy(&mut entry, &mut out)?;
                Ok(())
            }));
        }

        for handle in handles {
            handle.join().expect("zip member worker panicked")?;
        }

        Ok(())
    })
}

fn extract_tar(source: &Path, ctx: &ExtractionContext, dump_dir: &Path, gzipped: bool) -> Result<()> {
    let all_basenames = list_tar_basenames(source, gzipped)?;
    let selected = select_members(ctx, &all_basenames);

    let file = File::open(source)?;
    let mut archive = open_tar_archive(file, gzipped);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.to_path_buf();
        let basename = entry_path.file_name().map(PathBuf::from).unwrap_or(entry_path.clone());
        let basename_str = basename.to_string_lossy().into_owned();

        if !selected.contains(&basename_str) {
            continue;
        }

        let output_path = dump_dir.join(&basename);

        log::debug!("extracting {}", entry_path.display());

        let mut out = File::create(&output_path)?;
        io::copy(&mut entry, &mut out)?;
    }

    Ok(())
}

fn list_tar_basenames(source: &Path, gzipped: bool) -> Result<Vec<String>> {
    let file = File::open(source)?;
    let mut archive = open_tar_archive(file, gzipped);

    let mut names = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        let path = entry.path()?.to_path_buf();
        let basename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        names.push(basename);
    }
    Ok(names)
}

enum TarReader {
    Plain(File),
    Gz(GzDecoder<File>),
}

impl Read for TarReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            TarReader::Plain(f) => f.read(buf),
            TarReader::Gz(g) => g.read(buf),
        }
    }
}

fn open_tar_archive(file: File, gzipped: bool) -> tar::Archive<TarReader> {
    if gzipped {
        tar::Archive::new(TarReader::Gz(GzDecoder::new(file)))
    } else {
        tar::Archive::new(TarReader::Plain(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_zip(path: &Path, members: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, contents) in members {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn extracts_only_filtered_members_from_zip() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("fw.zip");
        write_zip(
            &archive_path,
            &[
                ("system.img", b"sysdata"),
                ("boot.img", b"bootdata"),
                ("META-INF/cert.rsa", b"nope"),
            ],
        );

        let dump_dir = dir.path().join("dump");
        std::fs::create_dir(&dump_dir).unwrap();

        let ctx = ExtractionContext::new(vec!["system".to_string()]);
        extract_image_file(&archive_path, &ctx, &dump_dir).unwrap();

        assert!(dump_dir.join("system.img").exists());
        assert!(!dump_dir.join("boot.img").exists());
        assert!(!dump_dir.join("cert.rsa").exists());
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("firmware.bin");
        std::fs::write(&path, b"nope").unwrap();

        let ctx = ExtractionContext::new(vec!["system".to_string()]);
        let err = extract_image_file(&path, &ctx, dir.path()).unwrap_err();
        assert!(matches!(err, ExtractError::UnknownArchiveType(_)));
    }
}
