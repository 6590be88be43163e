mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, short_day_structure, spawn_sidecar, temp_dir};

#[test]
fn structure_updates_are_validated_and_refused_when_in_use() {
    let workspace = temp_dir("timetabled-structure");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let current = request_ok(&mut stdin, &mut reader, "2", "structure.get", json!({}));
    assert_eq!(current["teachingPeriodsPerWeek"], 30);
    assert_eq!(current["structure"]["days"][0], "Monday");
    assert_eq!(current["structure"]["periods"][2]["isBreak"], true);

    let overlapping = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "structure.update",
        json!({
            "days": ["Monday"],
            "periods": [
                { "id": "P1", "label": "Period 1", "start": "08:00", "end": "09:00" },
                { "id": "P2", "label": "Period 2", "start": "08:30", "end": "09:30" }
            ]
        }),
    );
    assert_eq!(overlapping["code"], "invalid_structure");

    let bad_day = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "structure.update",
        json!({ "days": ["Caturday"], "periods": [] }),
    );
    assert_eq!(bad_day["code"], "bad_params");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "assignments.create",
        json!({ "day": "Friday", "periodId": "P6", "subject": "Drama", "teacherId": "t4", "classId": "8C" }),
    );
    let assignment_id = created["assignment"]["id"]
        .as_str()
        .expect("assignment id")
        .to_string();

    let no_friday = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "structure.update",
        json!({
            "days": ["Monday", "Tuesday", "Wednesday", "Thursday"],
            "periods": current["structure"]["periods"].clone()
        }),
    );
    assert_eq!(no_friday["code"], "structure_in_use");
    assert_eq!(no_friday["details"]["assignmentIds"], json!([assignment_id]));

    // P6 missing from the short day.
    let short = request_err(&mut stdin, &mut reader, "7", "structure.update", short_day_structure());
    assert_eq!(short["code"], "structure_in_use");

    request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "assignments.delete",
        json!({ "assignmentId": assignment_id }),
    );
    let replaced = request_ok(&mut stdin, &mut reader, "9", "structure.update", short_day_structure());
    assert_eq!(replaced["structure"]["periods"].as_array().expect("periods").len(), 5);
    let reread = request_ok(&mut stdin, &mut reader, "10", "structure.get", json!({}));
    assert_eq!(reread["teachingPeriodsPerWeek"], 20);
    assert_eq!(reread["structure"]["periods"][2]["start"], "09:45");

    let _ = child.kill();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn setup_sections_merge_defaults_and_validate_patches() {
    let workspace = temp_dir("timetabled-setup");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let no_ws = request_err(&mut stdin, &mut reader, "0", "setup.get", json!({}));
    assert_eq!(no_ws["code"], "no_workspace");

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let all = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    assert_eq!(all["timetable"]["upcomingLimit"], 3);
    assert_eq!(all["timetable"]["weekendFallback"], false);
    assert_eq!(all["roster"]["defaultTeacherMaxPeriods"], 30);

    let unknown = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "setup.update",
        json!({ "section": "timetable", "patch": { "colour": "blue" } }),
    );
    assert_eq!(unknown["code"], "bad_params");

    let out_of_range = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "setup.update",
        json!({ "section": "timetable", "patch": { "upcomingLimit": 0 } }),
    );
    assert_eq!(out_of_range["code"], "bad_params");

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "setup.update",
        json!({ "section": "roster", "patch": { "defaultTeacherMaxPeriods": 25 } }),
    );
    assert_eq!(updated["values"]["defaultTeacherMaxPeriods"], 25);

    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "teachers.upsert",
        json!({ "name": "Dana Pike" }),
    );
    assert_eq!(teacher["teacher"]["maxPeriods"], 25);
    let teacher_id = teacher["teacher"]["id"].as_str().expect("id").to_string();

    // Absent keeps the stored value; null clears it.
    let renamed = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "teachers.upsert",
        json!({ "id": teacher_id, "name": "Dana Pike-Ross" }),
    );
    assert_eq!(renamed["teacher"]["maxPeriods"], 25);
    let cleared = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "teachers.upsert",
        json!({ "id": teacher_id, "name": "Dana Pike-Ross", "maxPeriods": null }),
    );
    assert!(cleared["teacher"]["maxPeriods"].is_null());

    let one = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "setup.get",
        json!({ "section": "roster" }),
    );
    assert!(one.get("timetable").is_none());

    let _ = child.kill();
    let _ = std::fs::remove_dir_all(workspace);
}
