//! OBS Studio scene export
//!
//! Builds a scene collection with a single media source that plays the
//! stream's RTSP URL, so a stream can be imported into OBS in one step.

use serde_json::{json, Value};

use crate::registry::{PlaybackEndpoints, Stream, StreamAuth, StreamUrls};

/// Scene collection for a stream
///
/// The URL is derived from the stream's path even when the stream is not
/// running; the export is a config file, not a live link.
pub fn scene_collection(stream: &Stream, auth: Option<&StreamAuth>, endpoints: &PlaybackEndpoints) -> Value {
    let rtsp_url = StreamUrls::derive(&stream.path, auth, endpoints).rtsp_url;
    let name = &stream.name;
    let source_name = format!("{}_source", name);

    json!({
        "current_scene": name,
        "current_program_scene": name,
        "scene_order": [{ "name": name }],
        "name": format!("MediaMTX - {}", name),
        "sources": [{
            "versioned_id": "ffmpeg_source",
            "name": source_name,
            "id": "ffmpeg_source",
            "settings": {
                "input": rtsp_url,
                "input_format": "",
                "is_local_file": false,
                "looping": true,
                "restart_on_activate": true,
                "clear_on_media_end": false,
                "reconnect_delay_sec": 10,
                "hw_decode": true
            },
            "volume": 1.0,
            "muted": false
        }],
        "scenes": [{
            "name": name,
            "sources": [{
                "name": source_name,
                "id": 1,
                "enabled": true,
                "prev_ver_enabled": true,
                "visible": true,
                "locked": false,
                "pos": { "x": 0.0, "y": 0.0 },
                "scale": { "x": 1.0, "y": 1.0 },
                "rot": 0.0,
                "crop": { "left": 0, "top": 0, "right": 0, "bottom": 0 },
                "bounds": { "type": "OBS_BOUNDS_NONE", "alignment": 0, "x": 0.0, "y": 0.0 }
            }]
        }]
    })
}

/// Attachment file name for a stream's export
pub fn export_filename(stream: &Stream) -> String {
    format!("obs_scene_{}.json", stream.path)
}
