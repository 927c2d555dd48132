use std::path::Path;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::SqlitePoolOptions;

use crate::app_state::AppState;
use crate::auth::{
  Role,
  hash_password,
  normalize_email
};
use crate::billing::ANNUAL_PLAN_CODE;
use crate::config::{
  ConfigError,
  ServerConfig,
  SqlDialect,
  validate_schema_name
};
use crate::matching::MatchingClient;
use crate::payments::Gateways;
use crate::time::now_ms;

/// Child tables first so foreign keys
/// hold while clearing.
const RESET_TABLES: [&str; 9] = [
  "user_tokens",
  "matches",
  "payments",
  "subscriptions",
  "vacancies",
  "candidates",
  "companies",
  "plans",
  "users"
];

/// Builds the shared state around an
/// already-open pool pair.
pub fn build_state(
  config: &ServerConfig,
  sqlite: Option<sqlx::SqlitePool>,
  postgres: Option<sqlx::PgPool>
) -> Result<AppState, ConfigError> {
  let gateways =
    Gateways::from_config(config)
      .map_err(|e| {
        ConfigError::Invalid(format!(
          "payment client: {e}"
        ))
      })?;

  let matching =
    MatchingClient::new(&config.matching)
      .map_err(|e| {
        ConfigError::Invalid(format!(
          "matching client: {e}"
        ))
      })?;

  let configured = gateways
    .configured()
    .iter()
    .map(|p| p.as_str())
    .collect::<Vec<_>>()
    .join(",");

  tracing::info!(
    providers = %configured,
    matching = %config.matching.base_url,
    "outbound clients ready"
  );

  Ok(AppState {
    sqlite,
    postgres,
    token_ttl_seconds: config
      .auth
      .token_ttl_seconds,
    min_password_len: config
      .auth
      .min_password_len,
    billing: Arc::new(
      config.billing.clone()
    ),
    gateways,
    matching: Arc::new(matching)
  })
}

pub async fn connect_db(
  config: &ServerConfig,
  config_path: &Path
) -> Result<AppState, ConfigError> {
  match config.dialect()? {
    | SqlDialect::Sqlite => {
      let base_dir = config_path
        .parent()
        .ok_or_else(|| {
          ConfigError::Invalid(
            "config path has no parent"
              .into()
          )
        })?;

      let path =
        config.sqlite_path(base_dir);

      let url = format!(
        "sqlite://{}?mode=rwc",
        path.display()
      );

      let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .map_err(|e| {
          ConfigError::Invalid(format!(
            "sqlite connect failed: {e}"
          ))
        })?;

      tracing::info!(
        path = %path.display(),
        "sqlite pool ready"
      );

      build_state(config, Some(pool), None)
    }
    | SqlDialect::Postgres => {
      let pg = config
        .postgres
        .as_ref()
        .ok_or_else(|| {
          ConfigError::Invalid(
            "postgres section missing"
              .into()
          )
        })?;

      let schema =
        validate_schema_name(
          &pg.schema
        )?;

      let url = format!(
        "postgres://{}:{}@{}:{}/{}?\
         sslmode={}",
        pg.user,
        pg.password,
        pg.host,
        pg.port,
        pg.database,
        pg.ssl_mode
      );

      let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(set_search_path(
          schema.clone()
        ))
        .connect(&url)
        .await
        .map_err(|e| {
          ConfigError::Invalid(format!(
            "postgres connect failed: \
             {e}"
          ))
        })?;

      tracing::info!(
        host = %pg.host,
        schema = %schema,
        "postgres pool ready"
      );

      build_state(config, None, Some(pool))
    }
  }
}

pub async fn reset_server_data(
  config: &ServerConfig,
  state: &AppState
) -> Result<(), ConfigError> {
  match config.dialect()? {
    | SqlDialect::Sqlite => {
      let pool = state
        .sqlite
        .as_ref()
        .ok_or_else(|| {
          ConfigError::Invalid(
            "sqlite pool missing"
              .into()
          )
        })?;

      for table in RESET_TABLES {
        let query = format!(
          "DELETE FROM {table}"
        );

        if let Err(e) =
          sqlx::query(&query)
            .execute(pool)
            .await
          && !is_missing_table_error(&e)
        {
          return Err(
            ConfigError::Invalid(
              format!(
                "cleanup {table} \
                 failed: {e}"
              )
            )
          );
        }
      }
    }
    | SqlDialect::Postgres => {
      let pool = state
        .postgres
        .as_ref()
        .ok_or_else(|| {
          ConfigError::Invalid(
            "postgres pool missing"
              .into()
          )
        })?;

      let schema = config
        .postgres
        .as_ref()
        .ok_or_else(|| {
          ConfigError::Invalid(
            "postgres section missing"
              .into()
          )
        })?
        .schema
        .as_str();

      let schema =
        validate_schema_name(schema)?;

      let table_list = RESET_TABLES
        .iter()
        .map(|t| {
          format!(
            "{}.{}",
            quote_ident(&schema),
            quote_ident(t)
          )
        })
        .collect::<Vec<_>>()
        .join(", ");

      let stmt = format!(
        "TRUNCATE TABLE {table_list} \
         RESTART IDENTITY CASCADE"
      );

      if let Err(e) = sqlx::query(&stmt)
        .execute(pool)
        .await
        && !is_missing_table_error(&e)
      {
        return Err(
          ConfigError::Invalid(
            format!(
              "cleanup failed: {e}"
            )
          )
        );
      }
    }
  }

  tracing::warn!(
    "dev reset cleared all tables"
  );

  Ok(())
}

#[allow(clippy::type_complexity)]
pub fn set_search_path(
  schema: String
) -> impl Fn(
  &mut sqlx::PgConnection,
  sqlx::pool::PoolConnectionMetadata
) -> std::pin::Pin<
  Box<
    dyn std::future::Future<
        Output = Result<
          (),
          sqlx::Error
        >
      > + Send
      + '_
  >
> {
  move |conn, _meta| {
    let schema_ident =
      quote_ident(&schema);

    Box::pin(async move {
      let create_stmt = format!(
        "CREATE SCHEMA IF NOT EXISTS \
         {schema_ident}"
      );

      sqlx::query(&create_stmt)
        .execute(&mut *conn)
        .await?;

      let search_stmt = format!(
        "SET search_path TO \
         {schema_ident}"
      );

      sqlx::query(&search_stmt)
        .execute(&mut *conn)
        .await?;

      Ok(())
    })
  }
}

fn is_missing_table_error(
  e: &sqlx::Error
) -> bool {
  matches!(
      e,
      sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("42P01")
  )
}

pub fn quote_ident(
  name: &str
) -> String {
  format!(
    "\"{}\"",
    name.replace('"', "\"\"")
  )
}

/// Inserts the seed admin unless the
/// email is already taken. Blank seed
/// credentials skip seeding.
pub async fn ensure_default_admin(
  config: &ServerConfig,
  state: &AppState
) -> Result<(), ConfigError> {
  let password =
    config.seed.admin_password.as_str();

  let Some(email) = normalize_email(
    &config.seed.admin_email
  ) else {
    tracing::info!(
      "no seed admin configured"
    );
    return Ok(());
  };

  if password.is_empty() {
    return Err(ConfigError::Invalid(
      "seed.admin_password must be set \
       with seed.admin_email"
        .into()
    ));
  }

  let password_hash = hash_password(
    password
  )
  .map_err(|e| {
    ConfigError::Invalid(format!(
      "hash password: {e}"
    ))
  })?;

  let now = now_ms();

  let inserted = if let Some(pool) =
    &state.postgres
  {
    sqlx::query(
      "INSERT INTO users (email, \
       password_hash, role, \
       created_at_ms) VALUES ($1, $2, \
       $3, $4) ON CONFLICT (email) DO \
       NOTHING"
    )
    .bind(&email)
    .bind(&password_hash)
    .bind(Role::Admin.as_str())
    .bind(now)
    .execute(pool)
    .await
    .map(|r| r.rows_affected())
  } else {
    let pool = state
      .sqlite
      .as_ref()
      .ok_or_else(|| {
        ConfigError::Invalid(
          "sqlite pool missing".into()
        )
      })?;

    sqlx::query(
      "INSERT OR IGNORE INTO users \
       (email, password_hash, role, \
       created_at_ms) VALUES (?1, ?2, \
       ?3, ?4)"
    )
    .bind(&email)
    .bind(&password_hash)
    .bind(Role::Admin.as_str())
    .bind(now)
    .execute(pool)
    .await
    .map(|r| r.rows_affected())
  }
  .map_err(|e| {
    ConfigError::Invalid(format!(
      "seed admin insert failed: {e}"
    ))
  })?;

  if inserted > 0 {
    tracing::info!(
      email = %email,
      "seed admin created"
    );
  }

  Ok(())
}

/// Upserts the annual plan from the
/// billing section.
pub async fn ensure_annual_plan(
  config: &ServerConfig,
  state: &AppState
) -> Result<(), ConfigError> {
  let billing = &config.billing;

  if billing.annual_price_cents <= 0
    || billing.duration_days <= 0
  {
    return Err(ConfigError::Invalid(
      "billing price and duration must \
       be positive"
        .into()
    ));
  }

  if let Some(pool) = &state.postgres {
    sqlx::query(
      "INSERT INTO plans (code, name, \
       price_cents, currency, \
       duration_days, active) VALUES \
       ($1, $2, $3, $4, $5, TRUE) ON \
       CONFLICT (code) DO UPDATE SET \
       name = EXCLUDED.name, \
       price_cents = \
       EXCLUDED.price_cents, currency \
       = EXCLUDED.currency, \
       duration_days = \
       EXCLUDED.duration_days, active = \
       TRUE"
    )
    .bind(ANNUAL_PLAN_CODE)
    .bind(&billing.annual_plan_name)
    .bind(billing.annual_price_cents)
    .bind(&billing.currency)
    .bind(billing.duration_days)
    .execute(pool)
    .await
    .map_err(|e| {
      ConfigError::Invalid(format!(
        "annual plan upsert failed: {e}"
      ))
    })?;
  } else {
    let pool = state
      .sqlite
      .as_ref()
      .ok_or_else(|| {
        ConfigError::Invalid(
          "sqlite pool missing".into()
        )
      })?;

    sqlx::query(
      "INSERT INTO plans (code, name, \
       price_cents, currency, \
       duration_days, active) VALUES \
       (?1, ?2, ?3, ?4, ?5, 1) ON \
       CONFLICT (code) DO UPDATE SET \
       name = excluded.name, \
       price_cents = \
       excluded.price_cents, currency \
       = excluded.currency, \
       duration_days = \
       excluded.duration_days, active = \
       1"
    )
    .bind(ANNUAL_PLAN_CODE)
    .bind(&billing.annual_plan_name)
    .bind(billing.annual_price_cents)
    .bind(&billing.currency)
    .bind(billing.duration_days)
    .execute(pool)
    .await
    .map_err(|e| {
      ConfigError::Invalid(format!(
        "annual plan upsert failed: {e}"
      ))
    })?;
  }

  tracing::info!(
    price_cents =
      billing.annual_price_cents,
    currency = %billing.currency,
    days = billing.duration_days,
    "annual plan ready"
  );

  Ok(())
}
