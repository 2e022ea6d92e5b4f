use std::fs;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use riverscapes_ec::app::{
    ArtifactSpec, CreateRequest, Operator, ProjectService, RunRequest, RunStatus,
};
use riverscapes_ec::config::ResolvedConfig;
use riverscapes_ec::domain::{DatasetKind, OutputKind};
use riverscapes_ec::error::RsError;
use riverscapes_ec::project::{ProjectDocument, RealizationInput};

fn service() -> ProjectService {
    ProjectService::with_operator(
        ResolvedConfig::default(),
        Operator {
            user: "jlangdon".to_string(),
            computer: "GIS-01".to_string(),
        },
    )
}

fn create(service: &ProjectService, root: &Utf8Path) {
    service
        .create_project(CreateRequest {
            root: root.to_path_buf(),
            name: "Predicted Conductivity".to_string(),
            region: "CRB".to_string(),
            watershed: "Entiat".to_string(),
        })
        .unwrap();
}

fn write_shapefile(dir: &Utf8Path, stem: &str) -> Utf8PathBuf {
    for ext in ["shp", "shx", "dbf", "prj"] {
        fs::write(dir.join(format!("{stem}.{ext}")).as_std_path(), b"x").unwrap();
    }
    dir.join(format!("{stem}.shp"))
}

#[test]
fn create_writes_project_metadata() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("entiat")).unwrap();
    let service = service();
    create(&service, &root);

    let document = ProjectDocument::load(&root.join("project.rs.xml")).unwrap();
    assert_eq!(document.name(), "Predicted Conductivity");
    assert_eq!(document.meta("HUCID"), Some("17020010"));
    assert_eq!(document.meta("Region"), Some("CRB"));
    assert_eq!(document.meta("Watershed"), Some("Entiat"));
    assert_eq!(document.meta("Operator"), Some("jlangdon"));
    assert_eq!(document.meta("ComputerID"), Some("GIS-01"));
    assert!(root.join("Realizations/Prediction").is_dir());
}

#[test]
fn create_refuses_existing_project() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("entiat")).unwrap();
    let service = service();
    create(&service, &root);
    let before = fs::read_to_string(root.join("project.rs.xml").as_std_path()).unwrap();

    let err = service
        .create_project(CreateRequest {
            root: root.clone(),
            name: "Other".to_string(),
            region: "CRB".to_string(),
            watershed: "Entiat".to_string(),
        })
        .unwrap_err();
    assert_matches!(err, RsError::ProjectExists(_));
    let after = fs::read_to_string(root.join("project.rs.xml").as_std_path()).unwrap();
    assert_eq!(before, after);
}

#[test]
fn unknown_watershed_creates_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("nowhere")).unwrap();
    let err = service()
        .create_project(CreateRequest {
            root: root.clone(),
            name: "Predicted Conductivity".to_string(),
            region: "CRB".to_string(),
            watershed: "Nonexistent Basin".to_string(),
        })
        .unwrap_err();
    assert_matches!(err, RsError::WatershedNotFound(_));
    assert!(!root.exists());
}

#[test]
fn record_run_copies_and_registers_datasets() {
    let temp = tempfile::tempdir().unwrap();
    let base = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let root = base.join("entiat");
    let service = service();
    create(&service, &root);

    let catchments = write_shapefile(&base, "catchments");
    let table = base.join("ws_cond_param.dbf");
    fs::write(table.as_std_path(), b"dbf").unwrap();

    let result = service
        .record_run(RunRequest {
            root: root.clone(),
            kind: OutputKind::StatisticsSummary,
            name: "Entiat Parameter Summary".to_string(),
            parameters: vec![(
                "Environmental Parameter Workspace".to_string(),
                "/env/data".to_string(),
            )],
            inputs: vec![ArtifactSpec {
                kind: DatasetKind::Vector,
                name: "Catchment Area Polygons".to_string(),
                source: catchments.clone(),
            }],
            outputs: vec![ArtifactSpec {
                kind: DatasetKind::DataTable,
                name: "Environmental Parameter Table".to_string(),
                source: table,
            }],
            status: RunStatus::Success,
        })
        .unwrap();

    assert_eq!(result.inputs, ["Inputs/VECTOR1/catchments.shp"]);
    let table_path = format!(
        "Realizations/StatisticsSummary/{}/ws_cond_param.dbf",
        result.realization
    );
    assert_eq!(result.outputs, [table_path.clone()]);
    assert!(root.join("Inputs/VECTOR1/catchments.dbf").is_file());
    assert!(root.join(&table_path).is_file());

    let document = ProjectDocument::load(&root.join("project.rs.xml")).unwrap();
    assert_eq!(document.inputs().len(), 1);
    assert_eq!(document.inputs()[0].id.as_deref(), Some("VECTOR1"));
    assert!(document.date_modified().is_some());

    let realization = &document.realizations()[0];
    assert_eq!(realization.guid.to_string(), result.realization);
    assert_eq!(realization.meta("Status"), Some("Success"));
    assert_eq!(realization.meta("Operator"), Some("jlangdon"));
    assert!(realization.meta("ProcessingTime").is_some());
    assert_eq!(
        realization.parameter("Environmental Parameter Workspace"),
        Some("/env/data")
    );
    assert_eq!(
        realization.inputs,
        [RealizationInput::Ref {
            kind: DatasetKind::Vector,
            ref_id: "VECTOR1".to_string(),
        }]
    );
    assert!(realization.outputs[0].guid.is_some());

    // Second run reusing the same input keeps a single project-level entry.
    service
        .record_run(RunRequest {
            root: root.clone(),
            kind: OutputKind::Prediction,
            name: "Entiat Predicted Conductivity".to_string(),
            parameters: Vec::new(),
            inputs: vec![ArtifactSpec {
                kind: DatasetKind::Vector,
                name: "Catchment Area Polygons".to_string(),
                source: catchments,
            }],
            outputs: Vec::new(),
            status: RunStatus::Failed,
        })
        .unwrap();

    let summary = service.info(&root).unwrap();
    assert_eq!(summary.huc_id.as_deref(), Some("17020010"));
    assert_eq!(summary.inputs.len(), 1);
    assert_eq!(summary.realizations.len(), 2);
    assert_eq!(summary.realizations[1].status.as_deref(), Some("Failed"));
    assert_eq!(summary.realizations[1].inputs, 1);
}

fn csv_run(name: &str, input: &Utf8Path, output: &Utf8Path) -> RunRequest {
    RunRequest {
        root: Utf8PathBuf::new(),
        kind: OutputKind::Prediction,
        name: name.to_string(),
        parameters: Vec::new(),
        inputs: vec![ArtifactSpec {
            kind: DatasetKind::Csv,
            name: format!("{name} params"),
            source: input.to_path_buf(),
        }],
        outputs: vec![ArtifactSpec {
            kind: DatasetKind::Csv,
            name: "Predicted Conductivity".to_string(),
            source: output.to_path_buf(),
        }],
        status: RunStatus::Success,
    }
}

#[test]
fn runs_with_same_file_names_keep_their_own_data() {
    let temp = tempfile::tempdir().unwrap();
    let base = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let root = base.join("entiat");
    let service = service();
    create(&service, &root);

    for (dir, input, output) in [("a", "INPUT A", "RUN ONE"), ("b", "INPUT B", "RUN TWO")] {
        fs::create_dir(base.join(dir).as_std_path()).unwrap();
        fs::write(base.join(dir).join("params.csv").as_std_path(), input).unwrap();
        fs::write(base.join(dir).join("predicted_cond.csv").as_std_path(), output).unwrap();
    }

    let mut results = Vec::new();
    for (dir, name) in [("a", "run one"), ("b", "run two")] {
        let mut request = csv_run(
            name,
            &base.join(dir).join("params.csv"),
            &base.join(dir).join("predicted_cond.csv"),
        );
        request.root = root.clone();
        results.push(service.record_run(request).unwrap());
    }

    let read = |relative: &str| fs::read_to_string(root.join(relative).as_std_path()).unwrap();
    assert_eq!(read(&results[0].outputs[0]), "RUN ONE");
    assert_eq!(read(&results[1].outputs[0]), "RUN TWO");
    assert_eq!(read(&results[0].inputs[0]), "INPUT A");
    assert_eq!(read(&results[1].inputs[0]), "INPUT B");

    let document = ProjectDocument::load(&root.join("project.rs.xml")).unwrap();
    let inputs: Vec<_> = document
        .inputs()
        .iter()
        .map(|input| (input.id.as_deref(), input.name.as_str(), input.path.as_str()))
        .collect();
    assert_eq!(
        inputs,
        [
            (Some("CSV1"), "run one params", "Inputs/CSV1/params.csv"),
            (Some("CSV2"), "run two params", "Inputs/CSV2/params.csv"),
        ]
    );
    assert_eq!(
        document.realizations()[1].inputs,
        [RealizationInput::Ref {
            kind: DatasetKind::Csv,
            ref_id: "CSV2".to_string(),
        }]
    );
    assert_eq!(
        document.realizations()[0].outputs[0].path,
        results[0].outputs[0]
    );

    // Identical content is registered once.
    let mut again = csv_run(
        "run three",
        &base.join("a/params.csv"),
        &base.join("a/predicted_cond.csv"),
    );
    again.root = root.clone();
    let third = service.record_run(again).unwrap();
    assert_eq!(third.inputs, ["Inputs/CSV1/params.csv"]);
    let document = ProjectDocument::load(&root.join("project.rs.xml")).unwrap();
    assert_eq!(document.inputs().len(), 2);
}

#[test]
fn failed_record_leaves_project_untouched() {
    let temp = tempfile::tempdir().unwrap();
    let base = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let root = base.join("entiat");
    let service = service();
    create(&service, &root);
    let before = fs::read_to_string(root.join("project.rs.xml").as_std_path()).unwrap();

    fs::write(base.join("params.csv").as_std_path(), "INPUT").unwrap();
    fs::write(base.join("predicted_cond.csv").as_std_path(), "RUN").unwrap();
    fs::write(base.join("model.exe").as_std_path(), "binary").unwrap();

    let mut request = csv_run(
        "broken",
        &base.join("params.csv"),
        &base.join("predicted_cond.csv"),
    );
    request.root = root.clone();
    request.outputs.push(ArtifactSpec {
        kind: DatasetKind::File,
        name: "Model".to_string(),
        source: base.join("model.exe"),
    });
    let err = service.record_run(request).unwrap_err();
    assert_matches!(err, RsError::Filesystem(_));

    let after = fs::read_to_string(root.join("project.rs.xml").as_std_path()).unwrap();
    assert_eq!(before, after);
    assert_eq!(fs::read_dir(root.join("Inputs").as_std_path()).unwrap().count(), 0);
    assert_eq!(
        fs::read_dir(root.join("Realizations/Prediction").as_std_path())
            .unwrap()
            .count(),
        0
    );
}

#[test]
fn failed_copy_removes_staged_folders() {
    let temp = tempfile::tempdir().unwrap();
    let base = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let root = base.join("entiat");
    let service = service();
    create(&service, &root);
    let before = fs::read_to_string(root.join("project.rs.xml").as_std_path()).unwrap();

    fs::write(base.join("params.csv").as_std_path(), "INPUT").unwrap();
    fs::write(base.join("predicted_cond.csv").as_std_path(), "RUN").unwrap();
    let mut request = csv_run(
        "duplicate output",
        &base.join("params.csv"),
        &base.join("predicted_cond.csv"),
    );
    request.root = root.clone();
    let duplicate = request.outputs[0].clone();
    request.outputs.push(duplicate);

    assert_matches!(service.record_run(request), Err(RsError::Filesystem(_)));
    let after = fs::read_to_string(root.join("project.rs.xml").as_std_path()).unwrap();
    assert_eq!(before, after);
    assert_eq!(fs::read_dir(root.join("Inputs").as_std_path()).unwrap().count(), 0);
    assert_eq!(
        fs::read_dir(root.join("Realizations/Prediction").as_std_path())
            .unwrap()
            .count(),
        0
    );
}

#[test]
fn record_run_without_project() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("missing")).unwrap();
    let err = service()
        .record_run(RunRequest {
            root,
            kind: OutputKind::Prediction,
            name: "run".to_string(),
            parameters: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            status: RunStatus::Success,
        })
        .unwrap_err();
    assert_matches!(err, RsError::DocumentNotFound(_));
}
