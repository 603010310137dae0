//! SQL for the PostgreSQL store.
//!
//! Every function is generic over [`PgExecutor`], so it runs unchanged on the
//! pool or inside a transaction (`&mut *tx`). Match and standing statements
//! pick their table and columns from the [`ParticipantType`]; those names are
//! static strings, never user input.
#![allow(clippy::needless_raw_string_hashes)]

use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, Row, postgres::PgRow};
use std::str::FromStr;

use crate::tournament::models::{
    EntrantId, Format, FormatId, MatchId, NewMatch, Participant, ParticipantType, PersistedMatch,
    Standing, StandingDelta, Tournament, TournamentId, TournamentSchedule, TournamentStatus,
};

/// Table and column names of one match storage
struct MatchColumns {
    table: &'static str,
    slot1: &'static str,
    slot2: &'static str,
}

fn match_columns(kind: ParticipantType) -> MatchColumns {
    match kind {
        ParticipantType::Solo => MatchColumns {
            table: "solo_matches",
            slot1: "player1_id",
            slot2: "player2_id",
        },
        ParticipantType::Team => MatchColumns {
            table: "team_matches",
            slot1: "team1_id",
            slot2: "team2_id",
        },
    }
}

/// Participant / standing column holding the entrant id
fn entrant_column(kind: ParticipantType) -> &'static str {
    match kind {
        ParticipantType::Solo => "user_id",
        ParticipantType::Team => "team_id",
    }
}

fn decode<T>(value: String) -> sqlx::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.parse().map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

const TOURNAMENT_COLUMNS: &str = "id, name, format_id, organizer_id, max_participants, \
     registration_date, start_date, end_date, status";

fn tournament_from_row(row: &PgRow) -> sqlx::Result<Tournament> {
    let schedule = TournamentSchedule::new(
        row.try_get("registration_date")?,
        row.try_get("start_date")?,
        row.try_get("end_date")?,
    )
    .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(Tournament {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        format_id: row.try_get("format_id")?,
        organizer_id: row.try_get("organizer_id")?,
        max_participants: row.try_get("max_participants")?,
        schedule,
        status: decode(row.try_get("status")?)?,
    })
}

pub async fn fetch_tournament<'e, E: PgExecutor<'e>>(
    exec: E,
    id: TournamentId,
    for_update: bool,
) -> sqlx::Result<Option<Tournament>> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let sql = format!("SELECT {TOURNAMENT_COLUMNS} FROM tournaments WHERE id = $1{lock}");

    sqlx::query(&sql)
        .bind(id)
        .fetch_optional(exec)
        .await?
        .map(|row| tournament_from_row(&row))
        .transpose()
}

pub async fn fetch_due_tournaments<'e, E: PgExecutor<'e>>(
    exec: E,
    now: DateTime<Utc>,
) -> sqlx::Result<Vec<Tournament>> {
    let sql = format!(
        r#"
        SELECT {TOURNAMENT_COLUMNS}
        FROM tournaments
        WHERE (status = 'soon' AND registration_date <= $1)
           OR (status = 'registration' AND start_date <= $1)
           OR (status = 'active' AND end_date <= $1)
        ORDER BY id
        "#
    );

    sqlx::query(&sql)
        .bind(now)
        .fetch_all(exec)
        .await?
        .iter()
        .map(tournament_from_row)
        .collect()
}

pub async fn update_tournament_status<'e, E: PgExecutor<'e>>(
    exec: E,
    id: TournamentId,
    status: TournamentStatus,
) -> sqlx::Result<()> {
    sqlx::query("UPDATE tournaments SET status = $1, updated_at = NOW() WHERE id = $2")
        .bind(status.as_str())
        .bind(id)
        .execute(exec)
        .await?;
    Ok(())
}

pub async fn fetch_format<'e, E: PgExecutor<'e>>(
    exec: E,
    id: FormatId,
) -> sqlx::Result<Option<Format>> {
    let row = sqlx::query(
        "SELECT id, name, bracket_type, participant_type, settings FROM formats WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(exec)
    .await?;

    row.map(|row| {
        Ok(Format {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            bracket_type: row.try_get("bracket_type")?,
            participant_type: decode(row.try_get("participant_type")?)?,
            settings: row.try_get("settings")?,
        })
    })
    .transpose()
}

pub async fn fetch_participants<'e, E: PgExecutor<'e>>(
    exec: E,
    tournament_id: TournamentId,
) -> sqlx::Result<Vec<Participant>> {
    let rows = sqlx::query(
        r#"
        SELECT id, tournament_id, user_id, team_id, status
        FROM tournament_participants
        WHERE tournament_id = $1
        ORDER BY id
        "#,
    )
    .bind(tournament_id)
    .fetch_all(exec)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(Participant {
                id: row.try_get("id")?,
                tournament_id: row.try_get("tournament_id")?,
                user_id: row.try_get("user_id")?,
                team_id: row.try_get("team_id")?,
                status: decode(row.try_get("status")?)?,
            })
        })
        .collect()
}

pub async fn fetch_confirmed_entrants<'e, E: PgExecutor<'e>>(
    exec: E,
    tournament_id: TournamentId,
    kind: ParticipantType,
) -> sqlx::Result<Vec<EntrantId>> {
    let column = entrant_column(kind);
    let sql = format!(
        r#"
        SELECT {column} AS entrant_id
        FROM tournament_participants
        WHERE tournament_id = $1 AND status = 'confirmed' AND {column} IS NOT NULL
        ORDER BY id
        "#
    );

    sqlx::query_scalar(&sql)
        .bind(tournament_id)
        .fetch_all(exec)
        .await
}

pub async fn count_matches<'e, E: PgExecutor<'e>>(
    exec: E,
    tournament_id: TournamentId,
    kind: ParticipantType,
) -> sqlx::Result<i64> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE tournament_id = $1",
        match_columns(kind).table
    );

    sqlx::query_scalar(&sql)
        .bind(tournament_id)
        .fetch_one(exec)
        .await
}

pub async fn insert_match<'e, E: PgExecutor<'e>>(
    exec: E,
    kind: ParticipantType,
    new: &NewMatch,
) -> sqlx::Result<MatchId> {
    let MatchColumns {
        table,
        slot1,
        slot2,
    } = match_columns(kind);
    let sql = format!(
        r#"
        INSERT INTO {table} (tournament_id, round, match_order, bracket_match_id, {slot1}, {slot2}, status)
        VALUES ($1, $2, $3, $4, $5, $6, 'scheduled')
        RETURNING id
        "#
    );

    sqlx::query_scalar(&sql)
        .bind(new.tournament_id)
        .bind(new.round)
        .bind(new.match_order)
        .bind(&new.bracket_match_id)
        .bind(new.slot1)
        .bind(new.slot2)
        .fetch_one(exec)
        .await
}

pub async fn link_match<'e, E: PgExecutor<'e>>(
    exec: E,
    kind: ParticipantType,
    match_id: MatchId,
    next_match_id: MatchId,
    winner_to_slot: i16,
) -> sqlx::Result<()> {
    let sql = format!(
        "UPDATE {} SET next_match_id = $1, winner_to_slot = $2 WHERE id = $3",
        match_columns(kind).table
    );

    sqlx::query(&sql)
        .bind(next_match_id)
        .bind(winner_to_slot)
        .bind(match_id)
        .execute(exec)
        .await?;
    Ok(())
}

fn match_from_row(row: &PgRow, kind: ParticipantType) -> sqlx::Result<PersistedMatch> {
    let columns = match_columns(kind);

    Ok(PersistedMatch {
        id: row.try_get("id")?,
        kind,
        tournament_id: row.try_get("tournament_id")?,
        round: row.try_get("round")?,
        match_order: row.try_get("match_order")?,
        bracket_match_id: row.try_get("bracket_match_id")?,
        slot1: row.try_get(columns.slot1)?,
        slot2: row.try_get(columns.slot2)?,
        score1: row.try_get("score1")?,
        score2: row.try_get("score2")?,
        status: decode(row.try_get("status")?)?,
        winner_id: row.try_get("winner_id")?,
        next_match_id: row.try_get("next_match_id")?,
        winner_to_slot: row.try_get("winner_to_slot")?,
    })
}

fn match_select(kind: ParticipantType) -> String {
    let MatchColumns {
        table,
        slot1,
        slot2,
    } = match_columns(kind);
    format!(
        "SELECT id, tournament_id, round, match_order, bracket_match_id, {slot1}, {slot2}, \
         score1, score2, status, winner_id, next_match_id, winner_to_slot FROM {table}"
    )
}

pub async fn fetch_matches<'e, E: PgExecutor<'e>>(
    exec: E,
    tournament_id: TournamentId,
    kind: ParticipantType,
) -> sqlx::Result<Vec<PersistedMatch>> {
    let sql = format!(
        "{} WHERE tournament_id = $1 ORDER BY round, match_order",
        match_select(kind)
    );

    sqlx::query(&sql)
        .bind(tournament_id)
        .fetch_all(exec)
        .await?
        .iter()
        .map(|row| match_from_row(row, kind))
        .collect()
}

pub async fn fetch_match_for_update<'e, E: PgExecutor<'e>>(
    exec: E,
    kind: ParticipantType,
    match_id: MatchId,
) -> sqlx::Result<Option<PersistedMatch>> {
    let sql = format!("{} WHERE id = $1 FOR UPDATE", match_select(kind));

    sqlx::query(&sql)
        .bind(match_id)
        .fetch_optional(exec)
        .await?
        .map(|row| match_from_row(&row, kind))
        .transpose()
}

pub async fn complete_match<'e, E: PgExecutor<'e>>(
    exec: E,
    kind: ParticipantType,
    match_id: MatchId,
    (score1, score2): (i32, i32),
    winner: Option<EntrantId>,
) -> sqlx::Result<()> {
    let sql = format!(
        r#"
        UPDATE {}
        SET score1 = $1, score2 = $2, winner_id = $3, status = 'completed', updated_at = NOW()
        WHERE id = $4
        "#,
        match_columns(kind).table
    );

    sqlx::query(&sql)
        .bind(score1)
        .bind(score2)
        .bind(winner)
        .bind(match_id)
        .execute(exec)
        .await?;
    Ok(())
}

pub async fn fill_slot<'e, E: PgExecutor<'e>>(
    exec: E,
    kind: ParticipantType,
    match_id: MatchId,
    slot: i16,
    entrant: EntrantId,
) -> sqlx::Result<()> {
    let columns = match_columns(kind);
    let column = if slot == 1 { columns.slot1 } else { columns.slot2 };
    let sql = format!(
        "UPDATE {} SET {column} = $1, updated_at = NOW() WHERE id = $2",
        columns.table
    );

    sqlx::query(&sql)
        .bind(entrant)
        .bind(match_id)
        .execute(exec)
        .await?;
    Ok(())
}

pub async fn insert_standing<'e, E: PgExecutor<'e>>(
    exec: E,
    tournament_id: TournamentId,
    kind: ParticipantType,
    entrant: EntrantId,
) -> sqlx::Result<()> {
    let sql = format!(
        "INSERT INTO tournament_standings (tournament_id, {}) VALUES ($1, $2)",
        entrant_column(kind)
    );

    sqlx::query(&sql)
        .bind(tournament_id)
        .bind(entrant)
        .execute(exec)
        .await?;
    Ok(())
}

pub async fn apply_standing<'e, E: PgExecutor<'e>>(
    exec: E,
    tournament_id: TournamentId,
    kind: ParticipantType,
    entrant: EntrantId,
    delta: &StandingDelta,
) -> sqlx::Result<()> {
    let sql = format!(
        r#"
        UPDATE tournament_standings
        SET points = points + $1,
            played = played + $2,
            wins = wins + $3,
            draws = draws + $4,
            losses = losses + $5,
            score_for = score_for + $6,
            score_against = score_against + $7,
            updated_at = NOW()
        WHERE tournament_id = $8 AND {} = $9
        "#,
        entrant_column(kind)
    );

    sqlx::query(&sql)
        .bind(delta.points)
        .bind(delta.played)
        .bind(delta.wins)
        .bind(delta.draws)
        .bind(delta.losses)
        .bind(delta.score_for)
        .bind(delta.score_against)
        .bind(tournament_id)
        .bind(entrant)
        .execute(exec)
        .await?;
    Ok(())
}

pub async fn rerank_standings<'e, E: PgExecutor<'e>>(
    exec: E,
    tournament_id: TournamentId,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        UPDATE tournament_standings s
        SET rank = ranked.rank
        FROM (
            SELECT id,
                   ROW_NUMBER() OVER (
                       ORDER BY points DESC, (score_for - score_against) DESC, score_for DESC, id ASC
                   ) AS rank
            FROM tournament_standings
            WHERE tournament_id = $1
        ) ranked
        WHERE s.id = ranked.id
        "#,
    )
    .bind(tournament_id)
    .execute(exec)
    .await?;
    Ok(())
}

pub async fn fetch_standings<'e, E: PgExecutor<'e>>(
    exec: E,
    tournament_id: TournamentId,
) -> sqlx::Result<Vec<Standing>> {
    let rows = sqlx::query(
        r#"
        SELECT id, tournament_id, user_id, team_id, points, played, wins, draws, losses,
               score_for, score_against, rank
        FROM tournament_standings
        WHERE tournament_id = $1
        ORDER BY rank, id
        "#,
    )
    .bind(tournament_id)
    .fetch_all(exec)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(Standing {
                id: row.try_get("id")?,
                tournament_id: row.try_get("tournament_id")?,
                user_id: row.try_get("user_id")?,
                team_id: row.try_get("team_id")?,
                points: row.try_get("points")?,
                played: row.try_get("played")?,
                wins: row.try_get("wins")?,
                draws: row.try_get("draws")?,
                losses: row.try_get("losses")?,
                score_for: row.try_get("score_for")?,
                score_against: row.try_get("score_against")?,
                rank: row.try_get("rank")?,
            })
        })
        .collect()
}

pub async fn try_advisory_xact_lock<'e, E: PgExecutor<'e>>(
    exec: E,
    lock_id: i64,
) -> sqlx::Result<bool> {
    sqlx::query_scalar("SELECT pg_try_advisory_xact_lock($1)")
        .bind(lock_id)
        .fetch_one(exec)
        .await
}
