//! `GET /healthz` liveness probe. Always `200 OK` with body `ok`; it reads
//! no shared state, so earlier relay or aggregation traffic cannot change
//! the answer.

pub async fn healthz_handler() -> &'static str {
    "ok"
}
