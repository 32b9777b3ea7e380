//! Wire-Format fuer TCP-Verbindungen
//!
//! Frame-basiertes Protokoll: Laenge (u32 big-endian) + Envelope-Header + Body.
//!
//! ## Frame-Format
//!
//! ```text
//! +--------+--------+--------+--------+--------+--------+----...----+
//! | Laenge (u32 BE)                   | Typ (u16 BE)    | Code ...
//! +--------+--------+--------+--------+--------+--------+----...----+
//!   ... Code (u32 BE)                 | Body (Protobuf)            |
//! +--------+--------+--------+--------+----...----...----...-------+
//! ```
//!
//! Die Laenge zaehlt Typ, Code und Body (also `6 + body.len()`), nicht die
//! 4 Laengen-Bytes selbst. Maximale Frame-Groesse ist konfigurierbar
//! (Standard: 1 MB).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

use crate::envelope::{Envelope, MessageType};
use crate::error::{ProtocolError, ProtocolResult};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Frame-Groesse (1 MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Groesse des Laengen-Felds in Bytes
pub const LENGTH_FIELD_SIZE: usize = 4;

/// Typ (2) + Fehlercode (4)
pub const HEADER_SIZE: usize = 6;

// ---------------------------------------------------------------------------
// Kodierung ohne Stream
// ---------------------------------------------------------------------------

/// Kodiert ein Envelope als vollstaendigen Frame
///
/// Deterministisch: gleiches Envelope ergibt immer dieselben Bytes.
///
/// # Fehler
/// - `MalformedFrame` wenn der Frame `max_frame_size` ueberschreitet
pub fn encode_frame(envelope: &Envelope, max_frame_size: usize) -> ProtocolResult<Bytes> {
    let mut buf = BytesMut::new();
    frame_schreiben(envelope, max_frame_size, &mut buf)?;
    Ok(buf.freeze())
}

/// Dekodiert genau einen Frame aus einem vollstaendigen Buffer
///
/// # Fehler
/// - `MalformedFrame` bei zu grosser/zu kleiner Laenge, fehlenden oder
///   ueberzaehligen Bytes
pub fn decode_frame(bytes: &[u8], max_frame_size: usize) -> ProtocolResult<Envelope> {
    if bytes.len() < LENGTH_FIELD_SIZE {
        return Err(ProtocolError::malformed("Laengen-Feld unvollstaendig"));
    }
    let length = laenge_pruefen(
        u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize,
        max_frame_size,
    )?;
    let rest = &bytes[LENGTH_FIELD_SIZE..];
    if rest.len() != length {
        return Err(ProtocolError::malformed(format!(
            "Frame-Laenge {} passt nicht zu {} vorhandenen Bytes",
            length,
            rest.len()
        )));
    }
    Ok(envelope_lesen(Bytes::copy_from_slice(rest)))
}

fn laenge_pruefen(length: usize, max_frame_size: usize) -> ProtocolResult<usize> {
    if length > max_frame_size {
        return Err(ProtocolError::malformed(format!(
            "Frame zu gross: {} Bytes (Maximum: {} Bytes)",
            length, max_frame_size
        )));
    }
    if length < HEADER_SIZE {
        return Err(ProtocolError::malformed(format!(
            "Frame zu klein: {} Bytes (Minimum: {} Bytes)",
            length, HEADER_SIZE
        )));
    }
    Ok(length)
}

/// Liest Typ, Code und Body aus dem Frame-Inhalt (ohne Laengen-Feld)
fn envelope_lesen(mut inhalt: Bytes) -> Envelope {
    let message_type = MessageType::from_u16(inhalt.get_u16());
    let error_code = inhalt.get_u32();
    Envelope {
        message_type,
        error_code,
        body: inhalt,
    }
}

/// Schreibt einen Frame, nachdem die Laenge wie beim Lesen geprueft wurde
fn frame_schreiben(envelope: &Envelope, max_frame_size: usize, dst: &mut BytesMut) -> ProtocolResult<()> {
    let length = laenge_pruefen(HEADER_SIZE + envelope.body.len(), max_frame_size)?;
    let length_feld = u32::try_from(length).map_err(|_| {
        ProtocolError::malformed(format!("Frame-Laenge {} passt nicht in u32", length))
    })?;
    dst.reserve(LENGTH_FIELD_SIZE + length);
    dst.put_u32(length_feld);
    dst.put_u16(envelope.message_type.as_u16());
    dst.put_u32(envelope.error_code);
    dst.put_slice(&envelope.body);
    Ok(())
}

// ---------------------------------------------------------------------------
// FrameCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer frame-basierte TCP-Verbindungen
///
/// Implementiert `Encoder<Envelope>` und `Decoder` fuer nahtlose
/// Integration mit `tokio_util::codec::Framed`.
///
/// # Beispiel
///
/// ```rust,no_run
/// use tokio_util::codec::Framed;
/// use matchhall_protocol::wire::FrameCodec;
///
/// // let stream = TcpStream::connect(...).await?;
/// // let framed = Framed::new(stream, FrameCodec::new());
/// ```
#[derive(Debug, Clone)]
pub struct FrameCodec {
    /// Maximale erlaubte Frame-Groesse in Bytes
    max_frame_size: usize,
}

impl FrameCodec {
    /// Erstellt einen neuen `FrameCodec` mit Standard-Limits
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Erstellt einen `FrameCodec` mit benutzerdefinierter maximaler Frame-Groesse
    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Gibt die konfigurierte maximale Frame-Groesse zurueck
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Decoder-Implementierung
// ---------------------------------------------------------------------------

impl Decoder for FrameCodec {
    type Item = Envelope;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Warte auf mindestens 4 Bytes fuer das Laengen-Feld
        if src.len() < LENGTH_FIELD_SIZE {
            return Ok(None);
        }

        // Laenge lesen ohne den Buffer zu veraendern
        let length = laenge_pruefen(
            u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize,
            self.max_frame_size,
        )?;

        // Pruefen ob der vollstaendige Frame bereits im Buffer ist
        let total_size = LENGTH_FIELD_SIZE + length;
        if src.len() < total_size {
            // Speicher vorbelegen um Reallocations zu vermeiden
            src.reserve(total_size - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_FIELD_SIZE);
        let inhalt = src.split_to(length).freeze();
        Ok(Some(envelope_lesen(inhalt)))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            None => Err(ProtocolError::malformed(format!(
                "Verbindung mitten im Frame beendet ({} Bytes offen)",
                buf.len()
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Encoder-Implementierung
// ---------------------------------------------------------------------------

impl Encoder<Envelope> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        frame_schreiben(&item, self.max_frame_size, dst)
    }
}

// ---------------------------------------------------------------------------
// Hilfsfunktionen fuer direktes async Lesen/Schreiben
// ---------------------------------------------------------------------------

/// Liest einen einzelnen Frame aus einem `AsyncRead`
///
/// Gibt `Ok(None)` zurueck wenn der Stream sauber an einer Frame-Grenze endet.
///
/// # Fehler
/// - `MalformedFrame` wenn die Verbindung mitten im Frame getrennt wird
///   oder die Laenge ungueltig ist
/// - `Io` bei sonstigen Lesefehlern
pub async fn read_frame<R>(reader: &mut R, max_frame_size: usize) -> ProtocolResult<Option<Envelope>>
where
    R: AsyncRead + Unpin,
{
    // Laengen-Feld lesen; EOF vor dem ersten Byte ist kein Fehler
    let mut len_buf = [0u8; LENGTH_FIELD_SIZE];
    let gelesen = reader.read(&mut len_buf).await?;
    if gelesen == 0 {
        return Ok(None);
    }
    reader
        .read_exact(&mut len_buf[gelesen..])
        .await
        .map_err(eof_als_malformed)?;

    let length = laenge_pruefen(u32::from_be_bytes(len_buf) as usize, max_frame_size)?;

    let mut inhalt = vec![0u8; length];
    reader
        .read_exact(&mut inhalt)
        .await
        .map_err(eof_als_malformed)?;

    Ok(Some(envelope_lesen(Bytes::from(inhalt))))
}

/// Schreibt einen einzelnen Frame in einen `AsyncWrite`
///
/// # Fehler
/// - `MalformedFrame` wenn die Nachricht die maximale Groesse ueberschreitet
/// - `Io` beim Schreiben
pub async fn write_frame<W>(
    writer: &mut W,
    envelope: &Envelope,
    max_frame_size: usize,
) -> ProtocolResult<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_frame(envelope, max_frame_size)?).await?;
    Ok(())
}

fn eof_als_malformed(e: io::Error) -> ProtocolError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        ProtocolError::malformed("Verbindung mitten im Frame beendet")
    } else {
        ProtocolError::Io(e)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
