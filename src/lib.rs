//! AWS service adapters for the LittleBit audio app.
//!
//! The crate loads a layered [`Config`](config::Config), talks to Cognito, S3 and AppSync and
//! exposes all of it through the Amplify shaped functions of [`Services`](services::Services):
//!
//! ```rust,ignore
//! let config = ConfigManager::new(LoadOptions::default()).load().await?;
//! let services = initialize_services(&config, InitOptions::default()).await?;
//!
//! services.sign_in(SignInInput { username, password }).await?;
//! let url = services.get_url(GetUrlInput::new("sounds/a.wav")).await?;
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `APP_ENV`, `NODE_ENV` | Selects the environment defaults | `development` |
//! | `APP_AWS_REGION`, `AWS_DEFAULT_REGION` | Region of all AWS services | `us-west-2` |
//! | `APP_COGNITO_USER_POOL_ID`, `APP_COGNITO_CLIENT_ID` | The Cognito user pool | |
//! | `APP_COGNITO_IDENTITY_POOL_ID`, `APP_COGNITO_REGION` | The Cognito identity pool | |
//! | `APP_S3_BUCKET_NAME`, `APP_S3_REGION` | The bucket holding all objects | |
//! | `APP_APPSYNC_ENDPOINT`, `APP_APPSYNC_REGION` | The GraphQL endpoint | |
//! | `APP_APPSYNC_AUTH_TYPE`, `APP_APPSYNC_API_KEY` | How GraphQL requests authenticate | `AMAZON_COGNITO_USER_POOLS` |
//! | `APP_SQS_QUEUE_URL` | Queue for processing jobs | |
//! | `APP_API_BASE_URL`, `APP_API_TIMEOUT` | REST API and the HTTP timeout in ms | |
//! | `APP_FEATURE_*` | Feature flags (`AUDIO_PROCESSING`, `SOCIAL_SHARING`, `ANALYTICS`) | |
//! | `REACT_APP_USE_NEW_AUTH` | Set to `true` to prefer the Cognito auth adapter over a legacy backend | `false` |
//! | `REACT_APP_USE_NEW_STORAGE` | Set to `false` to prefer a legacy storage backend over the S3 adapter | `true` |
//! | `REACT_APP_USE_NEW_API` | Set to `false` to prefer a legacy api backend over the GraphQL adapter | `true` |
//!
//! Legacy backends are passed via [`InitOptions`]. A subsystem without one always uses the
//! adapter of this crate.
//! | `RUST_LOG` | Log filter, see [`logging`] | `info` |

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod hub;
pub mod logging;
pub mod services;
pub mod storage;

pub use services::{BackendSelection, InitOptions, Services, ServicesBuilder, initialize_services};
