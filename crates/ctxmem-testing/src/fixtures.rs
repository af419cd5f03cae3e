//! Seeds a fresh in-memory `Database` with a project/space/session triple,
//! the minimum graph every agent test needs before it can exercise a tool.

use ctxmem_store::{queries, Database, Result};
use ctxmem_types::{Project, ProjectId, SessionId, SpaceId};

pub struct SeededWorld {
    pub db: Database,
    pub project_id: ProjectId,
    pub space_id: SpaceId,
    pub session_id: SessionId,
}

/// Opens an in-memory database and inserts one project, one space under it,
/// and one session linked to that space.
pub fn seeded_world() -> Result<SeededWorld> {
    let db = Database::open_in_memory()?;
    let project_id = ProjectId::new();
    queries::project::insert(
        db.conn(),
        &Project {
            id: project_id,
            name: "fixture-project".to_string(),
        },
    )?;

    let space_id = SpaceId::new();
    queries::space::insert(db.conn(), space_id, project_id)?;

    let session_id = SessionId::new();
    queries::session::insert(db.conn(), session_id, Some(space_id))?;

    Ok(SeededWorld {
        db,
        project_id,
        space_id,
        session_id,
    })
}
