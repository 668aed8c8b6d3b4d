use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AgendaQuestion {
    pub id: i64,
    pub agenda_id: i64,
    pub question: String,
    pub order_num: i32,
    pub is_generated: bool,
    pub answered: bool,
}
