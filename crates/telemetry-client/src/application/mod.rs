pub mod track_telemetry;
