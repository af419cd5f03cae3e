use ctxmem_store::queries::{block, project, space};
use ctxmem_store::{Database, Result};
use ctxmem_types::{BlockType, Project, ProjectId, SopData, SpaceId, ToolSopEntry};

fn seeded_space(db: &Database) -> (ProjectId, SpaceId) {
    let project = Project {
        id: ProjectId::new(),
        name: "acme".into(),
    };
    project::insert(db.conn(), &project).unwrap();
    let space_id = SpaceId::new();
    space::insert(db.conn(), space_id, project.id).unwrap();
    (project.id, space_id)
}

/// spec §8 scenario 3: space construction inserts under the correct page.
#[test]
fn space_construction_inserts_sop_under_correct_page() -> Result<()> {
    let db = Database::open_in_memory()?;
    let (project_id, space_id) = seeded_space(&db);

    let projects_folder = block::create_path_block(
        db.conn(),
        space_id,
        "Projects",
        serde_json::Value::Null,
        None,
        BlockType::Folder,
    )?;
    let github_page = block::create_path_block(
        db.conn(),
        space_id,
        "Github",
        serde_json::Value::Null,
        Some(projects_folder),
        BlockType::Page,
    )?;

    let paths = block::list_paths_under(db.conn(), space_id, None, 2)?;
    assert_eq!(paths.get("Projects/Github"), Some(&github_page));

    let sop = SopData {
        use_when: "star a repo on github.com".into(),
        tool_sops: vec![ToolSopEntry {
            tool_name: "click".into(),
            action: "Star".into(),
        }],
        ..Default::default()
    };
    let sop_block = block::write_sop_to_parent(db.conn(), space_id, github_page, &sop)?;

    let fetched = block::fetch_block(db.conn(), sop_block)?;
    assert_eq!(fetched.parent_id, Some(github_page));
    assert_eq!(fetched.sort, 0);
    assert_eq!(fetched.block_type, BlockType::Sop);

    let tool_ref = project::upsert_tool_reference(db.conn(), project_id, "click")?;
    let siblings = block::fetch_children_by_types(
        db.conn(),
        space_id,
        Some(github_page),
        &[BlockType::Sop, BlockType::Text],
    )?;
    assert_eq!(siblings.len(), 1);
    assert_eq!(siblings[0].id, sop_block);

    let count: i64 = db.conn().query_row(
        "SELECT COUNT(*) FROM tool_sops WHERE tool_ref_id = ?1",
        [tool_ref.to_string()],
        |row| row.get(0),
    )?;
    assert_eq!(count, 1);
    Ok(())
}

/// spec §8 scenario 4: parent-type rejection.
#[test]
fn parent_type_violations_are_rejected() -> Result<()> {
    let db = Database::open_in_memory()?;
    let (_project_id, space_id) = seeded_space(&db);

    let folder = block::create_path_block(
        db.conn(),
        space_id,
        "Projects",
        serde_json::Value::Null,
        None,
        BlockType::Folder,
    )?;
    let sop = SopData {
        preferences: "always confirm before deleting".into(),
        ..Default::default()
    };
    assert!(block::write_sop_to_parent(db.conn(), space_id, folder, &sop).is_err());

    let page = block::create_path_block(
        db.conn(),
        space_id,
        "Page",
        serde_json::Value::Null,
        None,
        BlockType::Page,
    )?;
    assert!(block::create_path_block(
        db.conn(),
        space_id,
        "Nested",
        serde_json::Value::Null,
        Some(page),
        BlockType::Page,
    )
    .is_err());

    Ok(())
}
