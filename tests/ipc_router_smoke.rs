mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{request, request_ok, spawn_sidecar, temp_dir};

fn assert_routed(resp: &serde_json::Value, method: &str) {
    if resp.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = resp
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(code, "not_implemented", "unexpected unknown method for {}", method);
    }
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("timetabled-router-smoke");
    let restored = temp_dir("timetabled-router-restore");
    let bundle_out = workspace.join("smoke-backup.ttbackup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health["workspacePath"].is_null());
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let calls: Vec<(&str, serde_json::Value)> = vec![
        ("setup.get", json!({})),
        ("setup.update", json!({ "section": "timetable", "patch": { "upcomingLimit": 4 } })),
        ("structure.get", json!({})),
        ("departments.upsert", json!({ "id": "hum", "name": "Humanities", "subjects": ["History"] })),
        ("departments.list", json!({})),
        ("teachers.upsert", json!({ "id": "t1", "name": "Ines Moreau", "departmentId": "hum" })),
        ("teachers.list", json!({ "departmentId": "hum" })),
        (
            "assignments.create",
            json!({ "day": "Thursday", "periodId": "P5", "subject": "History", "teacherId": "t1", "classId": "10A" }),
        ),
        ("assignments.list", json!({ "classId": "10A" })),
        (
            "assignments.bulkImport",
            json!({ "assignments": [
                { "id": "b1", "day": "Friday", "periodId": "P1", "subject": "History", "teacherId": "t1", "classId": "10B" }
            ] }),
        ),
        ("timetable.view", json!({ "kind": "department", "id": "hum" })),
        (
            "timetable.slot",
            json!({ "kind": "student", "id": "10A", "day": "Thursday", "periodId": "P5" }),
        ),
        ("timetable.today", json!({ "kind": "student", "id": "10A", "asOf": "2026-10-22T08:00" })),
        ("timetable.upcoming", json!({ "kind": "teacher", "id": "t1", "asOf": "2026-10-22T08:00" })),
        ("timetable.nextClass", json!({ "kind": "teacher", "id": "t1" })),
        ("timetable.conflicts", json!({})),
        ("stats.teacherUtilization", json!({ "teacherId": "t1" })),
        ("stats.subjectDistribution", json!({ "kind": "department", "id": "hum" })),
        ("stats.departmentOverview", json!({ "departmentId": "hum" })),
        ("structure.update", json!({ "days": ["Monday"], "periods": [] })),
        ("assignments.update", json!({ "assignmentId": "b1", "patch": { "room": "H2" } })),
        ("assignments.delete", json!({ "assignmentId": "b1" })),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let resp = request(&mut stdin, &mut reader, &format!("s{}", i), method, params);
        assert_routed(&resp, method);
    }

    let upcoming = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "timetable.upcoming",
        json!({ "kind": "teacher", "id": "t1", "asOf": "2026-10-22T08:00" }),
    );
    assert_eq!(upcoming["classes"][0]["period"]["id"], "P5");

    let export = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "backup.exportWorkspaceBundle",
        json!({
            "workspacePath": workspace.to_string_lossy(),
            "outPath": bundle_out.to_string_lossy()
        }),
    );
    assert_eq!(export["bundleFormat"], "timetable-workspace-v1");
    assert_eq!(export["entryCount"], 2);

    let import = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "backup.importWorkspaceBundle",
        json!({
            "workspacePath": restored.to_string_lossy(),
            "inPath": bundle_out.to_string_lossy()
        }),
    );
    assert_eq!(import["dbSha256"], export["dbSha256"]);
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "assignments.list",
        json!({ "teacherId": "t1" }),
    );
    assert_eq!(listed["assignments"].as_array().expect("assignments").len(), 1);

    request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "teachers.delete",
        json!({ "teacherId": "t1" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "departments.delete",
        json!({ "departmentId": "hum" }),
    );

    let unknown = request(&mut stdin, &mut reader, "9", "grades.compute", json!({}));
    assert_eq!(unknown["error"]["code"], "not_implemented");

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush garbage");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read bad_json response");
    let bad: serde_json::Value = serde_json::from_str(line.trim()).expect("parse bad_json response");
    assert_eq!(bad["error"]["code"], "bad_json");

    let _ = child.kill();
    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(restored);
}
