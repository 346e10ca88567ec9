//! Pack every archive format to disk, reopen it, and extract the entries.

use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};

use tempfile::{NamedTempFile, tempfile};

use vnkit::Error;
use vnkit::formats::ExtensionSet;
use vnkit::formats::akb;
use vnkit::formats::ankh::{self, AnkhReader, SnrVersion};
use vnkit::formats::banana::{self, BananaReader};
use vnkit::formats::bnd::{self, BndReader};
use vnkit::formats::gcc;
use vnkit::formats::gspack::{self, GsPackReader};
use vnkit::formats::mma::{MmaCoding, MmaReader};
use vnkit::formats::pd3::Pd3Reader;
use vnkit::formats::yox::{self, Yox, YoxReader, YoxVersion};

fn sample_files() -> Vec<(String, Vec<u8>)> {
    vec![
        ("start.txt".to_string(), b"scenario start\r\n".repeat(40)),
        ("empty.bin".to_string(), Vec::new()),
        ("cg01.bmp".to_string(), (0..=255u8).cycle().take(3000).collect()),
    ]
}

/// Write with `pack` into a fresh temporary file and rewind it.
fn on_disk<F>(pack: F) -> File
where
    F: FnOnce(&mut BufWriter<&mut File>) -> vnkit::Result<()>,
{
    let mut file = tempfile().unwrap();
    {
        let mut w = BufWriter::new(&mut file);
        pack(&mut w).unwrap();
        w.flush().unwrap();
    }
    file.seek(SeekFrom::Start(0)).unwrap();
    file
}

#[test]
fn ankh_snr_archive_survives_disk() {
    let files = sample_files();
    let file = on_disk(|w| ankh::pack(w, &files, Some(SnrVersion::V1)));

    let mut reader = AnkhReader::new(file).unwrap();
    for (name, data) in &files {
        let entry = reader[name.as_str()].clone();
        let out = reader.extract(&entry, Some(SnrVersion::V1)).unwrap();
        assert_eq!(&out, data, "{name}");
    }
}

#[test]
fn bnd_archive_survives_disk() {
    let files: Vec<_> = sample_files()
        .into_iter()
        .enumerate()
        .map(|(i, (_, data))| (format!("{i:05}"), data))
        .collect();
    let file = on_disk(|w| bnd::pack(w, &files));

    let mut reader = BndReader::new(file).unwrap();
    let entries: Vec<_> = reader.files().cloned().collect();
    assert_eq!(entries.len(), files.len());
    for (entry, (_, data)) in entries.iter().zip(&files) {
        assert_eq!(&reader.extract(entry).unwrap(), data);
    }
}

#[test]
fn banana_archive_survives_disk() {
    let compressed: ExtensionSet = ["txt"].into_iter().collect();
    let files = sample_files();
    let file = on_disk(|w| banana::pack(w, &files, &compressed));

    let mut reader = BananaReader::new(file).unwrap();
    for (name, data) in &files {
        let entry = reader[name.as_str()].clone();
        assert_eq!(&reader.extract(&entry, &compressed).unwrap(), data, "{name}");
    }
}

#[test]
fn gspack_archive_survives_disk() {
    let files = sample_files();
    let file = on_disk(|w| gspack::pack(w, &files));

    let mut reader = GsPackReader::new(file).unwrap();
    assert_eq!(reader.pack.header.index_entries, 3);
    for (name, data) in &files {
        let entry = reader[name.as_str()].clone();
        let out = reader.extract(&entry).unwrap();
        // Entries come back padded to four bytes.
        assert_eq!(&out[..data.len()], &data[..], "{name}");
        assert!(out[data.len()..].iter().all(|&b| b == 0));
        assert_eq!(out.len() % 4, 0);
    }
}

#[test]
fn yox_repack_survives_disk() {
    // Minimal v1 archive: one entry at 0x10 and the index right after it.
    let mut original = Vec::new();
    original.extend_from_slice(&yox::SIGNATURE.to_le_bytes());
    original.extend_from_slice(&0u32.to_le_bytes());
    original.extend_from_slice(&0x14u32.to_le_bytes());
    original.extend_from_slice(&1u32.to_le_bytes());
    original.extend_from_slice(b"old!");
    original.extend_from_slice(&0x10u32.to_le_bytes());
    original.extend_from_slice(&4u32.to_le_bytes());
    original.extend_from_slice(b"trailing");

    let mut source = NamedTempFile::new().unwrap();
    source.write_all(&original).unwrap();
    let parsed = Yox::parse(&mut File::open(source.path()).unwrap(), YoxVersion::V1).unwrap();
    assert_eq!(parsed.trailer, b"trailing");

    let replacement = [("00000", b"new contents".to_vec())];
    let file = on_disk(|w| yox::repack(w, &parsed, &replacement, false));
    let mut reader = YoxReader::new(file, YoxVersion::V1).unwrap();
    let entry = reader["00000"].clone();
    assert_eq!(entry.offset, yox::ALIGNMENT);
    assert_eq!(reader.extract(&entry).unwrap(), b"new contents");
    assert_eq!(reader.yox.trailer, b"trailing");
}

#[test]
fn pd3_repack_survives_disk() {
    // Two-slot directory with a single .def entry.
    let mut original = Vec::new();
    original.extend_from_slice(&2u32.to_le_bytes());
    original.extend_from_slice(&1u32.to_le_bytes());
    original.extend_from_slice(&[0u8; 16]);
    let mut slot = vec![0u8; 0x11C];
    slot[..9].copy_from_slice(b"macro.def");
    slot[0x108..0x10C].copy_from_slice(&2u32.to_le_bytes());
    original.extend_from_slice(&slot);
    original.extend_from_slice(&[0u8; 0x11C]);
    original.extend_from_slice(&[0x21, 0x43]);

    let mut source = NamedTempFile::new().unwrap();
    source.write_all(&original).unwrap();
    let mut reader = Pd3Reader::new(File::open(source.path()).unwrap()).unwrap();
    let entry = reader["macro.def"].clone();
    assert_eq!(reader.extract(&entry).unwrap(), [0x12, 0x34]);

    let file = on_disk(|w| reader.repack(w, &[("macro.def", b"#define X 1")]));
    let mut repacked = Pd3Reader::new(file).unwrap();
    let entry = repacked["macro.def"].clone();
    assert_eq!(repacked.extract(&entry).unwrap(), b"#define X 1");

    let mut raw = Vec::new();
    repacked.read_file(&entry).unwrap().read_to_end(&mut raw).unwrap();
    assert_eq!(raw[0], b'#'.rotate_left(4));
}

#[test]
fn akb_image_survives_disk() {
    let (w, h) = (16u32, 9u32);
    let rgba: Vec<u8> = (0..w * h)
        .flat_map(|i| [(i % 16 * 16) as u8, (i / 16 * 28) as u8, 0x80, 0xFF])
        .collect();
    let mut file = on_disk(|out| akb::encode(out, w, h, &rgba));

    let image = akb::decode(&mut file).unwrap();
    assert_eq!((image.width, image.height, image.channels), (w, h, 4));
    assert_eq!(image.pixels, rgba);
}

#[test]
fn gcc_image_survives_disk() {
    let (w, h) = (5u32, 3u32);
    let rgba: Vec<u8> = (0..w * h)
        .flat_map(|i| [i as u8 * 10, 0x40, 0xC0, (i * 17) as u8])
        .collect();
    let mut file = on_disk(|out| gcc::encode(out, w, h, &rgba, None));

    let image = gcc::decode(&mut file).unwrap();
    assert_eq!((image.width, image.height, image.channels), (w, h, 4));
    assert_eq!(image.pixels, rgba);
}

#[test]
fn mma_repack_survives_disk() {
    let coding = MmaCoding {
        compressed: true,
        encrypted: true,
    };
    // One entry with a two-byte prefix, index at 0x14 before the data.
    let payload = coding.encode(b"first draft");
    let mut original = Vec::new();
    original.extend_from_slice(b"MMA\0");
    original.extend_from_slice(&0x14u32.to_le_bytes());
    original.extend_from_slice(&[0u8; 8]);
    original.extend_from_slice(&1u32.to_le_bytes());
    for v in [0x28, 11, 2 + payload.len(), 2, 0] {
        original.extend_from_slice(&(v as u32).to_le_bytes());
    }
    original.extend_from_slice(b"hd");
    original.extend_from_slice(&payload);

    let mut source = NamedTempFile::new().unwrap();
    source.write_all(&original).unwrap();
    let mut reader = MmaReader::new(File::open(source.path()).unwrap()).unwrap();
    let entry = reader["00000"].clone();
    assert_eq!(reader.extract(&entry, coding).unwrap(), b"first draft");

    let file = on_disk(|w| reader.repack(w, &[("00000", b"final draft, revised")], coding));
    let mut repacked = MmaReader::new(file).unwrap();
    let entry = repacked["00000"].clone();
    assert_eq!(entry.offset, original.len() as u64);
    assert_eq!(repacked.extract(&entry, coding).unwrap(), b"final draft, revised");
}

#[test]
fn corrupt_archives_are_rejected() {
    let file = on_disk(|w| {
        w.write_all(&0u32.to_le_bytes())?;
        Ok(())
    });
    assert!(matches!(AnkhReader::new(file), Err(Error::InvalidCount(0))));

    let file = on_disk(|w| {
        w.write_all(b"NotAPack")?;
        Ok(())
    });
    assert!(matches!(GsPackReader::new(file), Err(Error::UnexpectedEof)));
}
