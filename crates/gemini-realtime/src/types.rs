use serde::{Deserialize, Serialize};

// Outgoing messages

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
    ClientContent(ClientContent),
}

#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<AudioTranscriptionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<AudioTranscriptionConfig>,
}

impl Setup {
    /// Audio-out setup speaking with `voice` under `instructions`.
    pub fn voice(model: String, voice: &str, instructions: &str) -> Self {
        Self {
            model,
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: Some(SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: voice.to_string(),
                        },
                    },
                }),
            },
            system_instruction: Some(Content::text(None, instructions)),
            input_audio_transcription: None,
            output_audio_transcription: None,
        }
    }

    pub fn with_transcription(mut self, input: bool, output: bool) -> Self {
        self.input_audio_transcription = input.then_some(AudioTranscriptionConfig {});
        self.output_audio_transcription = output.then_some(AudioTranscriptionConfig {});
        self
    }
}

#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct AudioTranscriptionConfig {}

#[derive(Serialize, Debug, Clone, Default)]
pub struct RealtimeInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<Blob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<Blob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

// Shared

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: Some(text.to_string()),
                inline_data: None,
            }],
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

/// Base64 payload with its MIME type.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

// Incoming messages

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub go_away: Option<GoAway>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub input_transcription: Option<Transcription>,
    #[serde(default)]
    pub output_transcription: Option<Transcription>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Transcription {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

/// Flattened view of what the server said, in the order it should be handled.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    SetupComplete,
    /// Base64 audio exactly as received.
    Audio { mime_type: String, data: String },
    Text(String),
    InputTranscription(String),
    OutputTranscription(String),
    Interrupted,
    TurnComplete,
    GoAway { time_left: Option<String> },
    Close { reason: Option<String> },
}

impl ServerMessage {
    pub fn into_events(self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        if self.setup_complete.is_some() {
            events.push(ServerEvent::SetupComplete);
        }
        if let Some(content) = self.server_content {
            if content.interrupted {
                events.push(ServerEvent::Interrupted);
            }
            if let Some(text) = content.input_transcription.and_then(|t| t.text) {
                events.push(ServerEvent::InputTranscription(text));
            }
            for part in content.model_turn.map(|t| t.parts).unwrap_or_default() {
                if let Some(blob) = part.inline_data {
                    events.push(ServerEvent::Audio {
                        mime_type: blob.mime_type,
                        data: blob.data,
                    });
                }
                if let Some(text) = part.text {
                    events.push(ServerEvent::Text(text));
                }
            }
            if let Some(text) = content.output_transcription.and_then(|t| t.text) {
                events.push(ServerEvent::OutputTranscription(text));
            }
            if content.turn_complete {
                events.push(ServerEvent::TurnComplete);
            }
        }
        if let Some(go_away) = self.go_away {
            events.push(ServerEvent::GoAway {
                time_left: go_away.time_left,
            });
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_setup_wire_shape() {
        let setup = Setup::voice("models/m".into(), "Kore", "Be kind.").with_transcription(true, true);
        let value = serde_json::to_value(ClientMessage::Setup(setup)).unwrap();
        assert_eq!(
            value,
            json!({
                "setup": {
                    "model": "models/m",
                    "generationConfig": {
                        "responseModalities": ["AUDIO"],
                        "speechConfig": {"voiceConfig": {"prebuiltVoiceConfig": {"voiceName": "Kore"}}}
                    },
                    "systemInstruction": {"parts": [{"text": "Be kind."}]},
                    "inputAudioTranscription": {},
                    "outputAudioTranscription": {}
                }
            })
        );
    }

    #[test]
    fn test_realtime_audio_wire_shape() {
        let message = ClientMessage::RealtimeInput(RealtimeInput {
            audio: Some(Blob {
                mime_type: "audio/pcm;rate=16000".into(),
                data: "AAA=".into(),
            }),
            ..Default::default()
        });
        assert_eq!(
            serde_json::to_value(message).unwrap(),
            json!({"realtimeInput": {"audio": {"mimeType": "audio/pcm;rate=16000", "data": "AAA="}}})
        );
    }

    #[test]
    fn test_server_content_flattens_in_order() {
        let raw = json!({
            "serverContent": {
                "modelTurn": {"parts": [{"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAA="}}]},
                "outputTranscription": {"text": "Hello there"},
                "turnComplete": true
            }
        });
        let message: ServerMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(
            message.into_events(),
            vec![
                ServerEvent::Audio {
                    mime_type: "audio/pcm;rate=24000".into(),
                    data: "AAA=".into()
                },
                ServerEvent::OutputTranscription("Hello there".into()),
                ServerEvent::TurnComplete,
            ]
        );
    }

    #[test]
    fn test_setup_complete_and_interruption() {
        let message: ServerMessage = serde_json::from_str(r#"{"setupComplete": {}}"#).unwrap();
        assert_eq!(message.into_events(), vec![ServerEvent::SetupComplete]);

        let message: ServerMessage =
            serde_json::from_str(r#"{"serverContent": {"interrupted": true}}"#).unwrap();
        assert_eq!(message.into_events(), vec![ServerEvent::Interrupted]);
    }
}
