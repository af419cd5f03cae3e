use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::HashMap;

use ctxmem_types::{Block, BlockId, BlockType, Error as TypesError, SopData, SpaceId};

use crate::queries::{project, space};
use crate::{Error, Result};

pub(crate) fn row_to_block(row: &rusqlite::Row<'_>) -> rusqlite::Result<Block> {
    let id: String = row.get(0)?;
    let space_id: String = row.get(1)?;
    let parent_id: Option<String> = row.get(2)?;
    let block_type: String = row.get(3)?;
    let title: String = row.get(4)?;
    let props: String = row.get(5)?;
    let sort: i64 = row.get(6)?;
    let is_archived: bool = row.get(7)?;

    Ok(Block {
        id: id.parse().map_err(|_| rusqlite::Error::InvalidQuery)?,
        space_id: space_id.parse().map_err(|_| rusqlite::Error::InvalidQuery)?,
        parent_id: parent_id
            .map(|s| s.parse())
            .transpose()
            .map_err(|_| rusqlite::Error::InvalidQuery)?,
        block_type: BlockType::parse(&block_type).ok_or(rusqlite::Error::InvalidQuery)?,
        title,
        props: serde_json::from_str(&props).unwrap_or(Value::Null),
        sort,
        is_archived,
    })
}

const BLOCK_COLUMNS: &str = "id, space_id, parent_id, block_type, title, props, sort, is_archived";

pub fn fetch_block(conn: &Connection, block_id: BlockId) -> Result<Block> {
    conn.query_row(
        &format!("SELECT {BLOCK_COLUMNS} FROM blocks WHERE id = ?1"),
        params![block_id.to_string()],
        row_to_block,
    )
    .optional()?
    .ok_or_else(|| Error::not_found(format!("block {block_id} not found")))
}

fn parent_block_type(conn: &Connection, parent_id: Option<BlockId>) -> Result<Option<BlockType>> {
    match parent_id {
        Some(id) => Ok(Some(fetch_block(conn, id)?.block_type)),
        None => Ok(None),
    }
}

fn next_sort(conn: &Connection, parent_id: Option<BlockId>) -> Result<i64> {
    let count: i64 = match parent_id {
        Some(id) => conn.query_row(
            "SELECT COUNT(*) FROM blocks WHERE parent_id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?,
        None => conn.query_row(
            "SELECT COUNT(*) FROM blocks WHERE parent_id IS NULL",
            [],
            |row| row.get(0),
        )?,
    };
    Ok(count)
}

/// Two-phase negative-range resort (§4.B, §9): shifts every sibling with
/// `sort >= from_sort` up by one without ever colliding with an existing
/// `(parent_id, sort)` pair.
fn shift_siblings_from(conn: &Connection, parent_id: Option<BlockId>, from_sort: i64) -> Result<()> {
    match parent_id {
        Some(id) => {
            conn.execute(
                "UPDATE blocks SET sort = -(sort) - 1 WHERE parent_id = ?1 AND sort >= ?2",
                params![id.to_string(), from_sort],
            )?;
            conn.execute(
                "UPDATE blocks SET sort = -sort WHERE parent_id = ?1 AND sort < 0",
                params![id.to_string()],
            )?;
        }
        None => {
            conn.execute(
                "UPDATE blocks SET sort = -(sort) - 1 WHERE parent_id IS NULL AND sort >= ?1",
                params![from_sort],
            )?;
            conn.execute(
                "UPDATE blocks SET sort = -sort WHERE parent_id IS NULL AND sort < 0",
                [],
            )?;
        }
    }
    Ok(())
}

fn insert_row(
    conn: &Connection,
    id: BlockId,
    space_id: SpaceId,
    parent_id: Option<BlockId>,
    block_type: BlockType,
    title: &str,
    props: &Value,
    sort: i64,
) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO blocks ({BLOCK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)"
        ),
        params![
            id.to_string(),
            space_id.to_string(),
            parent_id.map(|p| p.to_string()),
            block_type.as_str(),
            title,
            serde_json::to_string(props)?,
            sort,
        ],
    )?;
    Ok(())
}

/// `create_path_block(space, title, props, parent?, type in {folder, page})`.
pub fn create_path_block(
    conn: &Connection,
    space_id: SpaceId,
    title: &str,
    props: Value,
    parent_id: Option<BlockId>,
    block_type: BlockType,
) -> Result<BlockId> {
    if !block_type.is_path_block() {
        return Err(TypesError::validation(format!(
            "create_path_block requires a path block type, got {}",
            block_type.as_str()
        ))
        .into());
    }
    let parent_type = parent_block_type(conn, parent_id)?;
    if !block_type.parent_allowed(parent_type) {
        return Err(TypesError::validation(format!(
            "{} cannot be created under parent type {:?}",
            block_type.as_str(),
            parent_type
        ))
        .into());
    }

    let sort = next_sort(conn, parent_id)?;
    let id = BlockId::new();
    insert_row(conn, id, space_id, parent_id, block_type, title, &props, sort)?;
    Ok(id)
}

/// `write_sop_to_parent(space, page_parent, sop_data)`: validates parent is a
/// page, validates `sop_data`, appends at the end of the page's children,
/// and upserts a `ToolReference` + `ToolSOP` row per `tool_sops` entry.
pub fn write_sop_to_parent(
    conn: &Connection,
    space_id: SpaceId,
    page_parent: BlockId,
    sop_data: &SopData,
) -> Result<BlockId> {
    sop_data.validate()?;

    let parent = fetch_block(conn, page_parent)?;
    if parent.block_type != BlockType::Page {
        return Err(TypesError::validation("write_sop_to_parent requires a page parent").into());
    }

    let project_id = space::fetch_project_id(conn, space_id)?;
    let sort = next_sort(conn, Some(page_parent))?;
    let id = BlockId::new();
    let title = if sop_data.use_when.trim().is_empty() {
        "SOP".to_string()
    } else {
        sop_data.use_when.clone()
    };
    let props = serde_json::to_value(sop_data)?;
    insert_row(conn, id, space_id, Some(page_parent), BlockType::Sop, &title, &props, sort)?;

    for entry in &sop_data.tool_sops {
        let tool_ref_id = project::upsert_tool_reference(conn, project_id, &entry.tool_name)?;
        conn.execute(
            "INSERT INTO tool_sops (id, block_id, tool_ref_id, action) VALUES (?1, ?2, ?3, ?4)",
            params![
                ctxmem_types::ToolReferenceId::new().to_string(),
                id.to_string(),
                tool_ref_id.to_string(),
                &entry.action,
            ],
        )?;
    }

    Ok(id)
}

/// A content block awaiting insertion into a page, as built by the
/// Space-Construction Agent for non-SOP candidates (§4.I) or the
/// `insert_block` HTTP endpoint (§6).
pub struct NewContentBlock {
    pub block_type: BlockType,
    pub title: String,
    pub props: Value,
}

/// Highest `sort` among a parent's children, or `-1` if it has none. Lets a
/// caller append at the end of a page via
/// `insert_block_to_page(..., after_block_index = last_sort(..) )`.
pub fn last_sort(conn: &Connection, parent_id: BlockId) -> Result<i64> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(sort) FROM blocks WHERE parent_id = ?1",
        params![parent_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(max.unwrap_or(-1))
}

/// `insert_block_to_page(space, page, candidate_data, after_block_index)`:
/// inserts at `after_block_index + 1`, shifting later siblings.
pub fn insert_block_to_page(
    conn: &Connection,
    space_id: SpaceId,
    page: BlockId,
    candidate: NewContentBlock,
    after_block_index: i64,
) -> Result<BlockId> {
    if !candidate.block_type.is_content_block() {
        return Err(TypesError::validation(format!(
            "insert_block_to_page requires a content block type, got {}",
            candidate.block_type.as_str()
        ))
        .into());
    }

    let parent = fetch_block(conn, page)?;
    if parent.block_type != BlockType::Page {
        return Err(TypesError::validation("insert_block_to_page requires a page parent").into());
    }

    let target_sort = after_block_index + 1;
    shift_siblings_from(conn, Some(page), target_sort)?;

    let id = BlockId::new();
    insert_row(
        conn,
        id,
        space_id,
        Some(page),
        candidate.block_type,
        &candidate.title,
        &candidate.props,
        target_sort,
    )?;
    Ok(id)
}

pub fn fetch_children_by_types(
    conn: &Connection,
    space_id: SpaceId,
    parent_id: Option<BlockId>,
    types: &[BlockType],
) -> Result<Vec<Block>> {
    let placeholders: Vec<String> = types.iter().map(|t| format!("'{}'", t.as_str())).collect();
    let type_filter = placeholders.join(", ");

    let query = match parent_id {
        Some(_) => format!(
            "SELECT {BLOCK_COLUMNS} FROM blocks
             WHERE space_id = ?1 AND parent_id = ?2 AND is_archived = 0 AND block_type IN ({type_filter})
             ORDER BY sort ASC"
        ),
        None => format!(
            "SELECT {BLOCK_COLUMNS} FROM blocks
             WHERE space_id = ?1 AND parent_id IS NULL AND is_archived = 0 AND block_type IN ({type_filter})
             ORDER BY sort ASC"
        ),
    };

    let mut stmt = conn.prepare(&query)?;
    let rows = match parent_id {
        Some(pid) => stmt
            .query_map(params![space_id.to_string(), pid.to_string()], row_to_block)?
            .collect::<std::result::Result<Vec<_>, _>>()?,
        None => stmt
            .query_map(params![space_id.to_string()], row_to_block)?
            .collect::<std::result::Result<Vec<_>, _>>()?,
    };
    Ok(rows)
}

/// `list_paths_under(space, block?, depth)`: a map from `/`-joined path
/// (relative to `block`, or root when `None`) to block id, over path blocks
/// only, recursing up to `depth` folder levels. A non-folder `block` is a
/// `bad_request`.
pub fn list_paths_under(
    conn: &Connection,
    space_id: SpaceId,
    root: Option<BlockId>,
    depth: u32,
) -> Result<HashMap<String, BlockId>> {
    if let Some(root_id) = root {
        let root_block = fetch_block(conn, root_id)?;
        if root_block.block_type != BlockType::Folder {
            return Err(Error::bad_request(format!(
                "list_paths_under root {root_id} is not a folder"
            )));
        }
    }

    let mut out = HashMap::new();
    collect_paths(conn, space_id, root, String::new(), depth, &mut out)?;
    Ok(out)
}

fn collect_paths(
    conn: &Connection,
    space_id: SpaceId,
    parent: Option<BlockId>,
    prefix: String,
    depth_remaining: u32,
    out: &mut HashMap<String, BlockId>,
) -> Result<()> {
    let children =
        fetch_children_by_types(conn, space_id, parent, &[BlockType::Folder, BlockType::Page])?;

    for child in children {
        let path = if prefix.is_empty() {
            child.title.clone()
        } else {
            format!("{prefix}/{}", child.title)
        };
        out.insert(path.clone(), child.id);

        if child.block_type == BlockType::Folder && depth_remaining > 0 {
            collect_paths(conn, space_id, Some(child.id), path, depth_remaining - 1, out)?;
        }
    }
    Ok(())
}
