//! End-to-end reconciliation runs against an in-memory sheet service.

use std::sync::{Arc, Mutex};

use acta_core::{ActivityRow, COMPARABLE_FIELDS};
use acta_sheets::{
    ColumnDef, ColumnMap, RowId, RowInsert, RowUpdate, Sheet, SheetError, SheetService,
};
use acta_sync::{
    apply_program, ActivitySource, PhaseStatus, ProgramConfig, ProgramDelta, ProgramRegistry,
    RowChange, SyncPipeline,
};
use async_trait::async_trait;

fn comparable_columns() -> Vec<ColumnDef> {
    COMPARABLE_FIELDS
        .iter()
        .enumerate()
        .map(|(idx, title)| ColumnDef {
            id: idx as i64 + 1,
            title: (*title).to_string(),
        })
        .collect()
}

fn empty_sheet() -> Sheet {
    serde_json::from_value(serde_json::json!({
        "columns": COMPARABLE_FIELDS
            .iter()
            .enumerate()
            .map(|(idx, title)| serde_json::json!({"id": idx as i64 + 1, "title": title}))
            .collect::<Vec<_>>(),
        "rows": []
    }))
    .expect("sheet")
}

#[derive(Default)]
struct Calls {
    updates: Vec<Vec<RowUpdate>>,
    inserts: Vec<Vec<RowInsert>>,
    deletes: Vec<Vec<String>>,
}

struct FakeSheetService {
    sheet: Sheet,
    fail_updates: bool,
    calls: Mutex<Calls>,
}

impl FakeSheetService {
    fn new(sheet: Sheet) -> Arc<Self> {
        Arc::new(Self {
            sheet,
            fail_updates: false,
            calls: Mutex::new(Calls::default()),
        })
    }

    fn failing_updates(sheet: Sheet) -> Arc<Self> {
        Arc::new(Self {
            sheet,
            fail_updates: true,
            calls: Mutex::new(Calls::default()),
        })
    }
}

#[async_trait]
impl SheetService for FakeSheetService {
    async fn columns(&self, _sheet_id: u64) -> Result<Vec<ColumnDef>, SheetError> {
        Ok(self.sheet.columns.clone())
    }

    async fn sheet(&self, _sheet_id: u64) -> Result<Sheet, SheetError> {
        Ok(self.sheet.clone())
    }

    async fn update_rows(&self, _sheet_id: u64, rows: Vec<RowUpdate>) -> Result<(), SheetError> {
        self.calls.lock().expect("calls").updates.push(rows);
        if self.fail_updates {
            return Err(SheetError::Status {
                status: 500,
                url: "fake://sheets".to_string(),
            });
        }
        Ok(())
    }

    async fn insert_rows(&self, _sheet_id: u64, rows: Vec<RowInsert>) -> Result<(), SheetError> {
        self.calls.lock().expect("calls").inserts.push(rows);
        Ok(())
    }

    async fn delete_rows(&self, _sheet_id: u64, ids: &[String]) -> Result<(), SheetError> {
        self.calls.lock().expect("calls").deletes.push(ids.to_vec());
        Ok(())
    }
}

/// Local newtype so a shared `Arc` handle can be handed to the pipeline as a
/// `Box<dyn SheetService>` without violating the orphan rule (`Arc` is
/// foreign and not `#[fundamental]`). The test keeps its own `Arc` clone to
/// inspect recorded calls after the run.
struct SharedFake(Arc<FakeSheetService>);

#[async_trait]
impl SheetService for SharedFake {
    async fn columns(&self, sheet_id: u64) -> Result<Vec<ColumnDef>, SheetError> {
        self.0.as_ref().columns(sheet_id).await
    }

    async fn sheet(&self, sheet_id: u64) -> Result<Sheet, SheetError> {
        self.0.as_ref().sheet(sheet_id).await
    }

    async fn update_rows(&self, sheet_id: u64, rows: Vec<RowUpdate>) -> Result<(), SheetError> {
        self.0.as_ref().update_rows(sheet_id, rows).await
    }

    async fn insert_rows(&self, sheet_id: u64, rows: Vec<RowInsert>) -> Result<(), SheetError> {
        self.0.as_ref().insert_rows(sheet_id, rows).await
    }

    async fn delete_rows(&self, sheet_id: u64, ids: &[String]) -> Result<(), SheetError> {
        self.0.as_ref().delete_rows(sheet_id, ids).await
    }
}

struct FixtureActivitySource {
    rows: Vec<ActivityRow>,
}

#[async_trait]
impl ActivitySource for FixtureActivitySource {
    async fn fetch_activity_rows(&self) -> anyhow::Result<Vec<ActivityRow>> {
        Ok(self.rows.clone())
    }
}

fn registry(program: &str) -> ProgramRegistry {
    ProgramRegistry {
        programs: vec![ProgramConfig {
            program: program.to_string(),
            sheet_id: 1,
        }],
    }
}

fn activity_row(program: &str, project_id: &str, activity_id: &str) -> ActivityRow {
    ActivityRow {
        program: Some(program.to_string()),
        project_id: Some(project_id.to_string()),
        activity_id: Some(activity_id.to_string()),
        col1: None,
        col2: None,
        col3: None,
        col4: None,
        col5: None,
        col6: None,
        date1: None,
        date2: None,
        date3: None,
        date4: None,
        activity_type: Some("other".to_string()),
    }
}

#[tokio::test]
async fn canonical_only_record_becomes_a_bottom_insert() {
    let mut row = activity_row("program1", "P1", "A1");
    row.col1 = Some(5.0);
    row.date1 = Some(chrono::NaiveDate::from_ymd_opt(2023, 1, 1).expect("date"));

    let sheets = FakeSheetService::new(empty_sheet());
    let pipeline = SyncPipeline::new(
        registry("program1"),
        Box::new(FixtureActivitySource { rows: vec![row] }),
        Box::new(SharedFake(Arc::clone(&sheets))),
    );

    let summary = pipeline.run_once().await.expect("run");
    assert_eq!(summary.reports.len(), 1);
    let report = &summary.reports[0];
    assert_eq!(report.program, "program1");
    assert_eq!(report.updates.status, PhaseStatus::Skipped);
    assert_eq!(report.inserts.status, PhaseStatus::Applied);
    assert_eq!(report.inserts.rows, 1);
    assert_eq!(report.deletes.status, PhaseStatus::Skipped);

    let calls = sheets.calls.lock().expect("calls");
    assert!(calls.updates.is_empty());
    assert!(calls.deletes.is_empty());
    assert_eq!(calls.inserts.len(), 1);
    let inserted = &calls.inserts[0][0];
    assert!(inserted.to_bottom);

    let columns = ColumnMap::from_columns(&comparable_columns());
    let date5 = inserted
        .cells
        .iter()
        .find(|cell| cell.column_id == columns.id("date5").unwrap())
        .expect("date5 cell");
    assert_eq!(date5.value, "2023-01-01");
    let wrapper = date5.object_value.as_ref().expect("date wrapper");
    assert_eq!(wrapper.values, vec!["2023-01-01".to_string()]);
}

#[tokio::test]
async fn matching_sides_dispatch_nothing() {
    let mut row = activity_row("program1", "P1", "A1");
    row.col1 = Some(1.0);

    let sheet: Sheet = serde_json::from_value(serde_json::json!({
        "columns": COMPARABLE_FIELDS
            .iter()
            .enumerate()
            .map(|(idx, title)| serde_json::json!({"id": idx as i64 + 1, "title": title}))
            .collect::<Vec<_>>(),
        "rows": [{
            "id": 9001,
            "cells": [
                {"columnId": 1, "value": "P1: A1"},
                {"columnId": 2, "value": "P1"},
                {"columnId": 3, "value": "A1"},
                {"columnId": 4, "value": 1},
                {"columnId": 13, "value": "Complete"}
            ]
        }]
    }))
    .expect("sheet");

    let sheets = FakeSheetService::new(sheet);
    let pipeline = SyncPipeline::new(
        registry("program1"),
        Box::new(FixtureActivitySource { rows: vec![row] }),
        Box::new(SharedFake(Arc::clone(&sheets))),
    );

    let summary = pipeline.run_once().await.expect("run");
    assert!(summary.reports.is_empty());

    let calls = sheets.calls.lock().expect("calls");
    assert!(calls.updates.is_empty());
    assert!(calls.inserts.is_empty());
    assert!(calls.deletes.is_empty());
}

#[tokio::test]
async fn four_hundred_fifty_deletes_chunk_into_three_calls() {
    let sheets = FakeSheetService::new(empty_sheet());
    let delta = ProgramDelta {
        updates: Vec::new(),
        inserts: Vec::new(),
        deletes: (1..=450).map(|i| RowId(format!("{i}.0"))).collect(),
    };
    let columns = ColumnMap::from_columns(&comparable_columns());

    let report = apply_program(sheets.as_ref(), 1, "program1", &delta, &columns).await;
    assert_eq!(report.deletes.status, PhaseStatus::Applied);
    assert_eq!(report.deletes.rows, 450);
    assert_eq!(report.deletes.calls, 3);

    let calls = sheets.calls.lock().expect("calls");
    let sizes: Vec<usize> = calls.deletes.iter().map(|chunk| chunk.len()).collect();
    assert_eq!(sizes, vec![200, 200, 50]);
    // decimal suffixes never reach the service
    assert_eq!(calls.deletes[0][0], "1");
    assert_eq!(calls.deletes[2][49], "450");
}

#[tokio::test]
async fn a_failed_update_phase_does_not_block_inserts_or_deletes() {
    let sheets = FakeSheetService::failing_updates(empty_sheet());
    let columns = ColumnMap::from_columns(&comparable_columns());

    let record = acta_core::CanonicalRecord {
        program: "program1".into(),
        unique_id: "P1: A1".into(),
        project_id: "P1".into(),
        activity_id: "A1".into(),
        col1: None,
        col2: None,
        col3: None,
        col4: None,
        col5: None,
        col6: None,
        date3: None,
        date4: None,
        date5: None,
        status: "Complete".into(),
    };
    let delta = ProgramDelta {
        updates: vec![RowChange {
            row_id: RowId::from("9001"),
            record: record.clone(),
        }],
        inserts: vec![record],
        deletes: vec![RowId::from("9002")],
    };

    let report = apply_program(sheets.as_ref(), 1, "program1", &delta, &columns).await;
    assert_eq!(report.updates.status, PhaseStatus::Failed);
    assert!(report.updates.error.is_some());
    assert_eq!(report.inserts.status, PhaseStatus::Applied);
    assert_eq!(report.deletes.status, PhaseStatus::Applied);

    let calls = sheets.calls.lock().expect("calls");
    assert_eq!(calls.updates.len(), 1);
    assert_eq!(calls.inserts.len(), 1);
    assert_eq!(calls.deletes.len(), 1);
}
