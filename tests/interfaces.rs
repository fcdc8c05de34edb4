mod common;

use std::path::{Path, PathBuf};

use common::{axial_slice, meta, FakeDicomReader, FakeStore};
use dcmnifti::interfaces::{
    CopyMeta, DcmStack, DicomFiles, GroupAndStack, LookupMeta, MergeNifti, NiftiGenerator,
    SortOrder, SplitNifti,
};
use dcmnifti::model::image::IDENTITY;
use dcmnifti::model::{Classification, MetaExtension, MetaImage};
use dcmnifti::Error;
use ndarray::{ArrayD, IxDyn};
use serde_json::json;

fn generator() -> NiftiGenerator {
    NiftiGenerator {
        out_dir: Some(PathBuf::from("/out")),
        ..NiftiGenerator::default()
    }
}

fn series(reader: &mut FakeDicomReader, uid: &str, extra: serde_json::Value, count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|z| {
            let name = format!("{uid}-{z}.dcm");
            reader.add(axial_slice(&name, uid, extra.clone(), z as f64))
        })
        .collect()
}

fn volume(value: f64, const_meta: serde_json::Value) -> MetaImage {
    let meta = MetaExtension::new(&[2, 2, 1])
        .with_class(Classification::GlobalConst, meta(const_meta));
    MetaImage::new(ArrayD::from_elem(IxDyn(&[2, 2, 1]), value), IDENTITY).with_meta(meta)
}

#[test]
fn test_dcmstack_default_name() {
    let mut reader = FakeDicomReader::default();
    let files = series(&mut reader, "1.2.3", json!({"SeriesNumber": 3, "ProtocolName": "T1"}), 3);
    let store = FakeStore::default();

    let stack = DcmStack {
        dicom_files: Some(DicomFiles::List(files.clone())),
        generator: generator(),
        ..DcmStack::default()
    };
    let output = stack.run(&reader, &store).unwrap();
    assert_eq!(output.out_file, PathBuf::from("/out/003-T1.nii.gz"));

    let image = store.get(&output.out_file).unwrap();
    assert_eq!(image.shape(), &[2, 2, 3]);
    assert!(image.meta.is_none());

    let embedded = DcmStack {
        embed_meta: true,
        ..stack
    };
    embedded.run(&reader, &store).unwrap();
    let image = store.get(&output.out_file).unwrap();
    let meta = image.meta.unwrap();
    assert_eq!(meta.const_dict().get("ProtocolName"), Some(&json!("T1")));
    assert!(meta.get_values("PatientName").is_none());
    assert!(meta.get_values("SeriesInstanceUID").is_none());
    assert_eq!(meta.shape, vec![2, 2, 3]);
}

#[test]
fn test_dcmstack_name_fallbacks() {
    let mut reader = FakeDicomReader::default();
    let flair = series(&mut reader, "1.1", json!({"SeriesDescription": "Flair"}), 1);
    let bare = series(&mut reader, "1.2", json!({}), 1);
    let store = FakeStore::default();

    for (files, expected) in [(flair, "/out/Flair.nii.gz"), (bare, "/out/sequence.nii.gz")] {
        let stack = DcmStack {
            dicom_files: Some(DicomFiles::List(files)),
            generator: generator(),
            ..DcmStack::default()
        };
        assert_eq!(stack.run(&reader, &store).unwrap().out_file, PathBuf::from(expected));
    }
}

#[test]
fn test_dcmstack_filters() {
    let mut reader = FakeDicomReader::default();
    let files = series(
        &mut reader,
        "1.2.3",
        json!({"EchoTime": 30, "PatientPosition": "HFS"}),
        2,
    );
    let store = FakeStore::default();

    let stack = DcmStack {
        dicom_files: Some(DicomFiles::List(files)),
        embed_meta: true,
        exclude_regexes: vec!["^Echo".to_string()],
        include_regexes: vec!["^PatientPosition$".to_string()],
        generator: generator(),
    };
    let output = stack.run(&reader, &store).unwrap();
    let image = store.get(&output.out_file).unwrap();
    let meta = image.meta.unwrap();
    assert!(meta.get_values("EchoTime").is_none());
    assert_eq!(meta.const_dict().get("PatientPosition"), Some(&json!("HFS")));
    assert!(meta.get_values("PatientName").is_none());
}

#[test]
fn test_dcmstack_errors() {
    let reader = FakeDicomReader::default();
    let store = FakeStore::default();

    let missing = DcmStack::default();
    assert!(matches!(missing.run(&reader, &store), Err(Error::MissingInput("dicom_files"))));

    let unreadable = DcmStack {
        dicom_files: Some(DicomFiles::List(vec![PathBuf::from("notes.txt")])),
        ..DcmStack::default()
    };
    assert!(matches!(unreadable.run(&reader, &store), Err(Error::DicomParse { .. })));
    assert!(store.paths().is_empty());
}

#[test]
fn test_group_and_stack_order() {
    let mut reader = FakeDicomReader::default();
    let mut files = series(&mut reader, "1.2.2", json!({"SeriesNumber": 1, "ProtocolName": "Flair"}), 2);
    files.extend(series(&mut reader, "1.2.1", json!({"SeriesNumber": 2, "ProtocolName": "T1"}), 3));
    let store = FakeStore::default();

    let group = GroupAndStack {
        stack: DcmStack {
            dicom_files: Some(DicomFiles::List(files)),
            generator: generator(),
            ..DcmStack::default()
        },
    };
    let output = group.run(&reader, &store).unwrap();
    assert_eq!(
        output.out_list,
        vec![
            PathBuf::from("/out/002-T1.nii.gz"),
            PathBuf::from("/out/001-Flair.nii.gz"),
        ]
    );
    assert_eq!(store.get(&output.out_list[0]).unwrap().shape(), &[2, 2, 3]);
    assert_eq!(store.get(&output.out_list[1]).unwrap().shape(), &[2, 2, 2]);

    // The same inputs always give the same order.
    assert_eq!(group.run(&reader, &store).unwrap(), output);
}

#[test]
fn test_group_and_stack_with_format() {
    let mut reader = FakeDicomReader::default();
    let mut files = series(&mut reader, "1.1", json!({"ProtocolName": "rest", "SeriesNumber": 4}), 2);
    files.extend(series(&mut reader, "1.2", json!({"ProtocolName": "rest", "SeriesNumber": 9}), 2));
    let store = FakeStore::default();

    let group = GroupAndStack {
        stack: DcmStack {
            dicom_files: Some(DicomFiles::List(files)),
            generator: NiftiGenerator {
                out_format: Some("%(ProtocolName)s".to_string()),
                ..generator()
            },
            ..DcmStack::default()
        },
    };
    let output = group.run(&reader, &store).unwrap();
    assert_eq!(output.out_list, vec![PathBuf::from("/out/rest.nii.gz")]);
    assert_eq!(store.get(&output.out_list[0]).unwrap().shape(), &[2, 2, 2, 2]);
}

#[test]
fn test_group_and_stack_format_needs_kept_key() {
    let mut reader = FakeDicomReader::default();
    let mut files = series(&mut reader, "1.1", json!({"SeriesNumber": 4}), 2);
    files.extend(series(&mut reader, "1.2", json!({"SeriesNumber": 9}), 2));
    let store = FakeStore::default();

    // Groups are keyed on the raw slice meta data, names come from the
    // filtered `global.const`, which drops UIDs by default.
    let mut group = GroupAndStack {
        stack: DcmStack {
            dicom_files: Some(DicomFiles::List(files)),
            generator: NiftiGenerator {
                out_format: Some("%(SeriesInstanceUID)s".to_string()),
                ..generator()
            },
            ..DcmStack::default()
        },
    };
    assert!(matches!(group.run(&reader, &store), Err(Error::Format { .. })));
    assert!(store.paths().is_empty());

    group.stack.include_regexes = vec!["SeriesInstanceUID".to_string()];
    let output = group.run(&reader, &store).unwrap();
    assert_eq!(
        output.out_list,
        vec![PathBuf::from("/out/1.1.nii.gz"), PathBuf::from("/out/1.2.nii.gz")]
    );
}

#[test]
fn test_lookup_meta() {
    let store = FakeStore::default();
    let mut image = volume(1.0, json!({"RepetitionTime": 2000.0}));
    image
        .ensure_meta()
        .class_dict_mut(Classification::GlobalSlices)
        .insert("SliceTiming".to_string(), json!([0.0]));
    store.insert("/in/bold.nii.gz", image);
    store.insert("/in/plain.nii.gz", MetaImage::new(ArrayD::zeros(IxDyn(&[2, 2, 1])), IDENTITY));

    let lookup = LookupMeta {
        in_file: Some(PathBuf::from("/in/bold.nii.gz")),
        meta_keys: vec![
            "RepetitionTime".to_string(),
            "SliceTiming".to_string(),
            "EchoTime".to_string(),
        ],
    };
    let values = lookup.run(&store).unwrap().0;
    assert_eq!(values["RepetitionTime"], Some(json!(2000.0)));
    assert_eq!(values["SliceTiming"], Some(json!([0.0])));
    assert_eq!(values["EchoTime"], None);

    let plain = LookupMeta {
        in_file: Some(PathBuf::from("/in/plain.nii.gz")),
        ..lookup.clone()
    };
    assert!(plain.run(&store).unwrap().0.values().all(Option::is_none));

    let no_keys = LookupMeta {
        meta_keys: Vec::new(),
        ..lookup
    };
    assert!(matches!(no_keys.run(&store), Err(Error::MissingInput("meta_keys"))));
}

#[test]
fn test_lookup_output_serializes_as_mapping() {
    let store = FakeStore::default();
    store.insert("/in/a.nii", volume(0.0, json!({"EchoTime": 30})));
    let lookup = LookupMeta {
        in_file: Some(PathBuf::from("/in/a.nii")),
        meta_keys: vec!["EchoTime".to_string(), "FlipAngle".to_string()],
    };
    let output = serde_json::to_value(lookup.run(&store).unwrap()).unwrap();
    assert_eq!(output, json!({"EchoTime": 30, "FlipAngle": null}));
}

#[test]
fn test_copy_meta_include_then_exclude() {
    let store = FakeStore::default();
    let mut src_meta = MetaExtension::new(&[2, 2, 2, 2])
        .with_class(Classification::GlobalConst, meta(json!({"EchoTime": 30})))
        .with_class(Classification::GlobalSlices, meta(json!({"SliceLocation": [0, 1, 0, 1]})))
        .with_class(Classification::TimeSamples, meta(json!({"AcquisitionTime": ["a", "b"]})));
    src_meta.slice_dim = Some(2);
    store.insert(
        "/in/src.nii",
        MetaImage::new(ArrayD::zeros(IxDyn(&[2, 2, 2, 2])), IDENTITY).with_meta(src_meta),
    );
    store.insert("/in/dest.nii", MetaImage::new(ArrayD::zeros(IxDyn(&[2, 2, 2, 2])), IDENTITY));

    let copy = CopyMeta {
        src_file: Some(PathBuf::from("/in/src.nii")),
        dest_file: Some(PathBuf::from("/in/dest.nii")),
        include_classes: vec![Classification::GlobalConst, Classification::TimeSamples],
        exclude_classes: vec![Classification::TimeSamples],
        out_dir: Some(PathBuf::from("/out")),
    };
    let output = copy.run(&store).unwrap();
    assert_eq!(output.dest_file, PathBuf::from("/out/dest.nii"));

    let dest = store.get(&output.dest_file).unwrap().meta.unwrap();
    assert_eq!(dest.const_dict().get("EchoTime"), Some(&json!(30)));
    assert!(dest.get_values("AcquisitionTime").is_none());
    assert!(dest.get_values("SliceLocation").is_none());
    assert_eq!(dest.slice_dim, Some(2));
    // The input is left alone.
    assert!(store.get(Path::new("/in/dest.nii")).unwrap().meta.is_none());
}

#[test]
fn test_copy_meta_nothing_selected() {
    let store = FakeStore::default();
    let mut src_meta = MetaExtension::new(&[2, 2, 1])
        .with_class(Classification::GlobalConst, meta(json!({"EchoTime": 30})));
    src_meta.slice_dim = Some(2);
    store.insert(
        "/in/src.nii",
        MetaImage::new(ArrayD::zeros(IxDyn(&[2, 2, 1])), IDENTITY).with_meta(src_meta),
    );
    store.insert("/in/dest.nii", volume(0.0, json!({"RepetitionTime": 2000})));

    let copy = CopyMeta {
        src_file: Some(PathBuf::from("/in/src.nii")),
        dest_file: Some(PathBuf::from("/in/dest.nii")),
        exclude_classes: vec![Classification::GlobalConst, Classification::GlobalSlices],
        out_dir: Some(PathBuf::from("/out")),
        ..CopyMeta::default()
    };
    let dest = store.get(&copy.run(&store).unwrap().dest_file).unwrap().meta.unwrap();
    assert_eq!(dest.slice_dim, None);
    assert!(dest.get_values("EchoTime").is_none());
    assert_eq!(dest.const_dict().get("RepetitionTime"), Some(&json!(2000)));
}

#[test]
fn test_copy_meta_errors() {
    let store = FakeStore::default();
    store.insert("/in/plain.nii", MetaImage::new(ArrayD::zeros(IxDyn(&[2, 2, 1])), IDENTITY));

    let copy = CopyMeta {
        src_file: Some(PathBuf::from("/in/plain.nii")),
        dest_file: Some(PathBuf::from("/in/plain.nii")),
        out_dir: Some(PathBuf::from("/out")),
        ..CopyMeta::default()
    };
    assert!(matches!(copy.run(&store), Err(Error::MissingExtension(_))));

    let missing = CopyMeta {
        dest_file: Some(PathBuf::from("/in/missing.nii")),
        ..copy
    };
    assert!(matches!(missing.run(&store), Err(Error::NotFound(_))));
}

#[test]
fn test_merge_sorted_then_split() {
    let store = FakeStore::default();
    for (name, echo) in [("b", 20), ("c", 30), ("a", 10)] {
        store.insert(
            format!("/in/{name}.nii"),
            volume(echo as f64, json!({"SeriesNumber": 5, "ProtocolName": "bold", "EchoTime": echo})),
        );
    }

    let merge = MergeNifti {
        in_files: ["b", "c", "a"]
            .iter()
            .map(|name| PathBuf::from(format!("/in/{name}.nii")))
            .collect(),
        sort_order: Some(SortOrder::from("EchoTime")),
        merge_dim: None,
        generator: generator(),
    };
    let merged_file = merge.run(&store).unwrap().out_file;
    assert_eq!(merged_file, PathBuf::from("/out/005-bold.nii.gz"));

    let merged = store.get(&merged_file).unwrap();
    assert_eq!(merged.shape(), &[2, 2, 3]);
    let values: Vec<f64> = (0..3).map(|z| merged.data[[0, 0, z]]).collect();
    assert_eq!(values, vec![10.0, 20.0, 30.0]);
    let meta = merged.meta.as_ref().unwrap();
    assert_eq!(meta.const_dict().get("SeriesNumber"), Some(&json!(5)));
    assert_eq!(meta.get_values("EchoTime"), Some(&json!([10, 20, 30])));

    let split = SplitNifti {
        in_file: Some(merged_file),
        split_dim: Some(2),
        generator: NiftiGenerator {
            out_format: Some("echo-%(EchoTime)02d".to_string()),
            ..generator()
        },
    };
    let out_list = split.run(&store).unwrap().out_list;
    assert_eq!(
        out_list,
        vec![
            PathBuf::from("/out/echo-10.nii.gz"),
            PathBuf::from("/out/echo-20.nii.gz"),
            PathBuf::from("/out/echo-30.nii.gz"),
        ]
    );
    for (path, echo) in out_list.iter().zip([10, 20, 30]) {
        let piece = store.get(path).unwrap();
        assert_eq!(piece.shape(), &[2, 2, 1]);
        assert!(piece.data.iter().all(|&value| value == echo as f64));
        assert_eq!(piece.get_meta("EchoTime"), Some(&json!(echo)));
    }
}

#[test]
fn test_split_disambiguates_names() {
    let store = FakeStore::default();
    let data = ArrayD::from_shape_fn(IxDyn(&[2, 2, 2, 3]), |idx| idx[3] as f64);
    let meta = MetaExtension::new(&[2, 2, 2, 3])
        .with_class(Classification::GlobalConst, meta(json!({"SeriesNumber": 7})));
    store.insert("/in/run.nii", MetaImage::new(data, IDENTITY).with_meta(meta));

    let split = SplitNifti {
        in_file: Some(PathBuf::from("/in/run.nii")),
        split_dim: None,
        generator: generator(),
    };
    let out_list = split.run(&store).unwrap().out_list;
    assert_eq!(
        out_list,
        vec![
            PathBuf::from("/out/007-sequence.nii.gz"),
            PathBuf::from("/out/007-sequence-001.nii.gz"),
            PathBuf::from("/out/007-sequence-002.nii.gz"),
        ]
    );
    assert_eq!(store.get(&out_list[2]).unwrap().shape(), &[2, 2, 2]);
}

#[test]
fn test_merge_requires_inputs() {
    let store = FakeStore::default();
    assert!(matches!(
        MergeNifti::default().run(&store),
        Err(Error::MissingInput("in_files"))
    ));
    let missing = MergeNifti {
        in_files: vec![PathBuf::from("/in/missing.nii")],
        ..MergeNifti::default()
    };
    assert!(matches!(missing.run(&store), Err(Error::NotFound(_))));
}
