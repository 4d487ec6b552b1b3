/// Checking that the scanner sorts fonts into the right wardrobes
///
/// Fonts hide in nested folders, shout their extensions in capitals and
/// sometimes show up twice. Whatever the mess, every filename stem should
/// end up as exactly one variant holding every format it was seen in.
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use fontfill_core::discovery::PathDiscovery;
use fontfill_core::{CancelToken, DownloadLinks, FontFormat, Kind, LocationCodec};
use proptest::prelude::*;

fn scanner(root: &Path) -> PathDiscovery {
    PathDiscovery::new(root, Arc::new(DownloadLinks::default()))
}

#[test]
fn discovers_all_four_formats_recursively() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();
    fs::create_dir_all(root.join("deep/er")).unwrap();
    fs::write(root.join("Sans.ttf"), b"\0\0ttf").unwrap();
    fs::write(root.join("deep/Sans.OTF"), b"\0\0otf").unwrap();
    fs::write(root.join("deep/er/Sans.woff"), b"wOFF").unwrap();
    fs::write(root.join("Sans.woff2"), b"wOF2").unwrap();

    let fonts = scanner(root).discover(&CancelToken::new()).expect("discover");

    assert_eq!(fonts.len(), 1);
    let sans = &fonts[OsStr::new("Sans")];
    for format in FontFormat::ALL {
        assert!(sans.has(format), "missing {format}");
    }
    assert_eq!(sans.preview_format(), FontFormat::Woff2);
}

#[test]
fn locations_decode_back_to_the_files() {
    let temp = tempfile::tempdir().expect("tempdir");
    let font = temp.path().join("With Space.ttf");
    fs::write(&font, b"\0\0font").unwrap();

    let fonts = scanner(temp.path())
        .discover(&CancelToken::new())
        .expect("discover");

    let location = fonts[OsStr::new("With Space")].location(FontFormat::Ttf).unwrap();
    assert_eq!(DownloadLinks::default().decode(location).unwrap(), font);
}

#[test]
fn ignores_non_font_extensions() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("readme.txt"), b"hello").unwrap();
    fs::write(temp.path().join("font.ttf.bak"), b"old").unwrap();

    let err = scanner(temp.path())
        .discover(&CancelToken::new())
        .expect_err("nothing to find");
    assert_eq!(err.kind(), Kind::DiscoveryEmpty);
    assert!(err.kind().is_discovery());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn distinct_stems_become_distinct_variants(
        stems in prop::collection::btree_set("[A-Za-z][A-Za-z0-9_-]{0,11}", 1..12),
        formats in prop::collection::vec(0usize..4, 12),
    ) {
        let temp = tempfile::tempdir().expect("tempdir");
        // case-insensitive filesystems would merge `A.ttf` and `a.ttf`
        let stems: BTreeSet<String> = stems
            .into_iter()
            .map(|s| s.to_ascii_lowercase())
            .collect();

        for (i, stem) in stems.iter().enumerate() {
            let format = FontFormat::ALL[formats[i % formats.len()]];
            fs::write(temp.path().join(format!("{stem}{}", format.ext())), b"font").unwrap();
        }

        let fonts = scanner(temp.path()).discover(&CancelToken::new()).expect("discover");

        let found: BTreeSet<String> = fonts.values().map(|v| v.name().to_string()).collect();
        prop_assert_eq!(found, stems);
        prop_assert!(fonts.values().all(|v| v.formats().len() == 1));
    }
}
