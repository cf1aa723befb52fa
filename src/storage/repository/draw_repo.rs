use crate::backtest::draw::{Draw, DRAW_SIZE};
use crate::storage::entity::draw::{self, ActiveModel as DrawActiveModel};
use crate::storage::entity::DrawRecord;
use crate::storage::now_ms;
use log::warn;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};

pub struct DrawRepository;

impl DrawRepository {
    /// Inserts draws, replacing the numbers of contests already stored.
    pub async fn upsert_many<C: ConnectionTrait>(db: &C, draws: &[Draw]) -> Result<u64, DbErr> {
        if draws.is_empty() {
            return Ok(0);
        }
        let now = now_ms();
        let models: Vec<DrawActiveModel> = draws
            .iter()
            .map(|d| DrawActiveModel {
                contest: Set(d.contest),
                numbers_json: Set(numbers_json(d)),
                imported_at: Set(now),
            })
            .collect();

        // SQLite caps bound parameters per statement
        for chunk in models.chunks(200) {
            DrawRecord::insert_many(chunk.to_vec())
                .on_conflict(
                    OnConflict::column(draw::Column::Contest)
                        .update_columns([draw::Column::NumbersJson, draw::Column::ImportedAt])
                        .to_owned(),
                )
                .exec(db)
                .await?;
        }
        Ok(draws.len() as u64)
    }

    /// All draws with contest number up to and including `up_to`.
    pub async fn load_up_to<C: ConnectionTrait>(db: &C, up_to: i32) -> Result<Vec<Draw>, DbErr> {
        let rows = DrawRecord::find()
            .filter(draw::Column::Contest.lte(up_to))
            .order_by_asc(draw::Column::Contest)
            .all(db)
            .await?;

        let mut draws = Vec::with_capacity(rows.len());
        for row in rows {
            match parse_numbers(&row) {
                Some(d) => draws.push(d),
                None => warn!("skipping malformed draw row contest={}", row.contest),
            }
        }
        Ok(draws)
    }

    pub async fn count<C: ConnectionTrait>(db: &C) -> Result<u64, DbErr> {
        DrawRecord::find().count(db).await
    }
}

fn numbers_json(d: &Draw) -> String {
    serde_json::to_string(&d.numbers).unwrap_or_else(|_| "[]".to_string())
}

fn parse_numbers(row: &draw::Model) -> Option<Draw> {
    let numbers: Vec<u8> = serde_json::from_str(&row.numbers_json).ok()?;
    let numbers: [u8; DRAW_SIZE] = numbers.try_into().ok()?;
    Draw::new(row.contest, numbers).ok()
}
