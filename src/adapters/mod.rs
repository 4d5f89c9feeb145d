//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements   | Connects to                      |
//! |------------|--------------|----------------------------------|
//! | `console`  | ConsolePort  | `esp_console` / host handlers    |
//! | `leds`     | LedPort      | `led` console command            |
//! | `log_sink` | EventSink    | Serial log output                |
//! | `nvs`      | ConfigPort   | NVS / in-memory store            |
//! |            | StoragePort  |                                  |
//! | `sdcard`   | FileStore    | SD card through the VFS          |
//! | `ssh`      | SshTransport | none (placeholder)               |
//! | `time`     |:            | ESP32 system timer, RTC          |

pub mod console;
pub mod leds;
pub mod log_sink;
pub mod nvs;
pub mod sdcard;
pub mod ssh;
pub mod time;
