//! In-Process Event-Bus
//!
//! Topic-adressiertes Publish/Subscribe zwischen Netzwerk-Handlern und
//! Session-/Matchmaking-Logik. Topics sind stabile 64-Bit-Ids, die einmalig
//! aus lesbaren Namen abgeleitet werden.
//!
//! ## Zustellung
//!
//! ```text
//! push2(topic, &a, &b)
//!   |
//!   +-- read-Lock: Listener-Liste fuer topic klonen, Lock freigeben
//!   |
//!   +-- fuer jeden Listener (synchron, im Kontext des Aufrufers):
//!         Arity passt nicht / Typ passt nicht -> uebersprungen (Vertragsverletzung)
//!         Err(..) oder Panic                  -> FaultSink, weiter mit dem naechsten
//!         Ok(())                              -> aufgerufen
//! ```
//!
//! Listener werden beim Registrieren in eine von fuenf Arity-Varianten
//! ([`Callback`]) ueberfuehrt. Die Argumente werden positionsweise per
//! `Any::downcast_ref` geprueft.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use crate::error::ListenerFault;
use crate::types::{SubscriberId, TopicId};

// ---------------------------------------------------------------------------
// Topic-Ids
// ---------------------------------------------------------------------------

/// Leitet die Topic-Id aus einem Namen ab
///
/// Die ersten 8 Bytes des SHA-256 des Namens, big-endian. Dadurch ist die Id
/// auch ueber Prozessgrenzen hinweg stabil.
pub fn topic_id(name: &str) -> TopicId {
    let hash = Sha256::digest(name.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash[..8]);
    TopicId(i64::from_be_bytes(bytes))
}

// ---------------------------------------------------------------------------
// Callbacks
// ---------------------------------------------------------------------------

/// Ein Argument hatte nicht den vom Listener deklarierten Typ
#[derive(Debug, Clone, Copy)]
pub struct TypFehler {
    pub position: usize,
    pub erwartet: &'static str,
}

type Aufruf = std::result::Result<anyhow::Result<()>, TypFehler>;

type Fn0 = dyn Fn() -> anyhow::Result<()> + Send + Sync;
type Fn1 = dyn Fn(&dyn Any) -> Aufruf + Send + Sync;
type Fn2 = dyn Fn(&dyn Any, &dyn Any) -> Aufruf + Send + Sync;
type Fn3 = dyn Fn(&dyn Any, &dyn Any, &dyn Any) -> Aufruf + Send + Sync;
type Fn4 = dyn Fn(&dyn Any, &dyn Any, &dyn Any, &dyn Any) -> Aufruf + Send + Sync;

/// Typ-geloeschter Listener, nach Arity getrennt
#[derive(Clone)]
pub enum Callback {
    Arity0(Arc<Fn0>),
    Arity1(Arc<Fn1>),
    Arity2(Arc<Fn2>),
    Arity3(Arc<Fn3>),
    Arity4(Arc<Fn4>),
}

impl Callback {
    /// Anzahl der Parameter
    pub fn arity(&self) -> usize {
        match self {
            Callback::Arity0(_) => 0,
            Callback::Arity1(_) => 1,
            Callback::Arity2(_) => 2,
            Callback::Arity3(_) => 3,
            Callback::Arity4(_) => 4,
        }
    }
}

impl std::fmt::Debug for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Callback(arity={})", self.arity())
    }
}

fn argument<T: Any>(wert: &dyn Any, position: usize) -> std::result::Result<&T, TypFehler> {
    wert.downcast_ref::<T>().ok_or(TypFehler {
        position,
        erwartet: std::any::type_name::<T>(),
    })
}

/// Registrierter Listener
#[derive(Debug, Clone)]
pub struct Subscription {
    pub subscriber: SubscriberId,
    pub topic: TopicId,
    pub callback: Callback,
}

// ---------------------------------------------------------------------------
// FaultSink
// ---------------------------------------------------------------------------

/// Empfaenger fuer Listener-Fehler und Vertragsverletzungen
pub trait FaultSink: Send + Sync {
    /// Ein Listener hat einen Fehler geliefert oder gepanict
    fn melden(&self, fault: &ListenerFault);

    /// Ein Listener wurde wegen falscher Arity oder Typen uebersprungen
    fn vertragsverletzung(&self, subscriber: SubscriberId, topic: TopicId, grund: &str) {
        tracing::warn!(
            subscriber = %subscriber,
            topic = %topic,
            grund,
            "Listener uebersprungen: Vertragsverletzung"
        );
    }
}

/// Standard-Sink: schreibt nur ins Log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingFaultSink;

impl FaultSink for TracingFaultSink {
    fn melden(&self, fault: &ListenerFault) {
        tracing::error!(
            subscriber = %fault.subscriber,
            topic = %fault.topic,
            panik = fault.panik,
            grund = %fault.grund,
            "Listener fehlgeschlagen"
        );
    }
}

// ---------------------------------------------------------------------------
// PushReport
// ---------------------------------------------------------------------------

/// Ergebnis eines einzelnen `push`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Listener, die erfolgreich durchgelaufen sind
    pub aufgerufen: usize,
    /// Listener mit falscher Arity oder falschen Argumenttypen
    pub uebersprungen: usize,
    /// Listener mit Fehler oder Panic
    pub fehlgeschlagen: usize,
}

impl PushReport {
    /// true wenn mindestens ein passender Listener ausgefuehrt wurde
    pub fn hat_empfaenger(&self) -> bool {
        self.aufgerufen + self.fehlgeschlagen > 0
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Topic-basierter Event-Bus
///
/// Clone ist guenstig (Arc). Eine Instanz pro Prozess, beim Start erzeugt.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

struct EventBusInner {
    topics: DashMap<String, TopicId>,
    listener: RwLock<HashMap<TopicId, Vec<Subscription>>>,
    fault_sink: Arc<dyn FaultSink>,
}

impl EventBus {
    /// Erstellt einen Bus, der Fehler nur loggt
    pub fn neu() -> Self {
        Self::mit_fault_sink(Arc::new(TracingFaultSink))
    }

    /// Erstellt einen Bus mit eigenem Fehler-Empfaenger
    pub fn mit_fault_sink(fault_sink: Arc<dyn FaultSink>) -> Self {
        Self {
            inner: Arc::new(EventBusInner {
                topics: DashMap::new(),
                listener: RwLock::new(HashMap::new()),
                fault_sink,
            }),
        }
    }

    /// Topic-Id fuer einen Namen (gecacht)
    pub fn topic(&self, name: &str) -> TopicId {
        if let Some(id) = self.inner.topics.get(name) {
            return *id;
        }
        *self
            .inner
            .topics
            .entry(name.to_string())
            .or_insert_with(|| topic_id(name))
    }

    // -----------------------------------------------------------------------
    // Registrierung
    // -----------------------------------------------------------------------

    fn registrieren(&self, subscriber: SubscriberId, topic: TopicId, callback: Callback) {
        tracing::trace!(
            subscriber = %subscriber,
            topic = %topic,
            arity = callback.arity(),
            "Listener registriert"
        );
        self.inner
            .listener
            .write()
            .entry(topic)
            .or_default()
            .push(Subscription {
                subscriber,
                topic,
                callback,
            });
    }

    pub fn add_listener0<F>(&self, subscriber: SubscriberId, topic: TopicId, f: F)
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.registrieren(subscriber, topic, Callback::Arity0(Arc::new(f)));
    }

    pub fn add_listener1<A, F>(&self, subscriber: SubscriberId, topic: TopicId, f: F)
    where
        A: Any,
        F: Fn(&A) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let cb = move |a: &dyn Any| -> Aufruf { Ok(f(argument::<A>(a, 0)?)) };
        self.registrieren(subscriber, topic, Callback::Arity1(Arc::new(cb)));
    }

    pub fn add_listener2<A, B, F>(&self, subscriber: SubscriberId, topic: TopicId, f: F)
    where
        A: Any,
        B: Any,
        F: Fn(&A, &B) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let cb = move |a: &dyn Any, b: &dyn Any| -> Aufruf {
            Ok(f(argument::<A>(a, 0)?, argument::<B>(b, 1)?))
        };
        self.registrieren(subscriber, topic, Callback::Arity2(Arc::new(cb)));
    }

    pub fn add_listener3<A, B, C, F>(&self, subscriber: SubscriberId, topic: TopicId, f: F)
    where
        A: Any,
        B: Any,
        C: Any,
        F: Fn(&A, &B, &C) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let cb = move |a: &dyn Any, b: &dyn Any, c: &dyn Any| -> Aufruf {
            Ok(f(
                argument::<A>(a, 0)?,
                argument::<B>(b, 1)?,
                argument::<C>(c, 2)?,
            ))
        };
        self.registrieren(subscriber, topic, Callback::Arity3(Arc::new(cb)));
    }

    pub fn add_listener4<A, B, C, D, F>(&self, subscriber: SubscriberId, topic: TopicId, f: F)
    where
        A: Any,
        B: Any,
        C: Any,
        D: Any,
        F: Fn(&A, &B, &C, &D) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let cb = move |a: &dyn Any, b: &dyn Any, c: &dyn Any, d: &dyn Any| -> Aufruf {
            Ok(f(
                argument::<A>(a, 0)?,
                argument::<B>(b, 1)?,
                argument::<C>(c, 2)?,
                argument::<D>(d, 3)?,
            ))
        };
        self.registrieren(subscriber, topic, Callback::Arity4(Arc::new(cb)));
    }

    /// Entfernt alle Listener mit passendem Subscriber UND Topic
    ///
    /// Gibt die Anzahl entfernter Listener zurueck; 0 ist kein Fehler.
    pub fn unsubscribe(&self, subscriber: SubscriberId, topic: TopicId) -> usize {
        let mut listener = self.inner.listener.write();
        let Some(liste) = listener.get_mut(&topic) else {
            return 0;
        };
        let vorher = liste.len();
        liste.retain(|s| s.subscriber != subscriber);
        let entfernt = vorher - liste.len();
        if liste.is_empty() {
            listener.remove(&topic);
        }
        entfernt
    }

    /// Entfernt alle Listener eines Subscribers ueber alle Topics
    pub fn clear_all_event_register(&self, subscriber: SubscriberId) -> usize {
        let mut listener = self.inner.listener.write();
        let mut entfernt = 0;
        listener.retain(|_, liste| {
            let vorher = liste.len();
            liste.retain(|s| s.subscriber != subscriber);
            entfernt += vorher - liste.len();
            !liste.is_empty()
        });
        if entfernt > 0 {
            tracing::debug!(subscriber = %subscriber, entfernt, "Alle Listener entfernt");
        }
        entfernt
    }

    /// Anzahl registrierter Listener fuer ein Topic
    pub fn listener_anzahl(&self, topic: TopicId) -> usize {
        self.inner
            .listener
            .read()
            .get(&topic)
            .map(|l| l.len())
            .unwrap_or(0)
    }

    /// Anzahl Listener eines Subscribers ueber alle Topics
    pub fn listener_von(&self, subscriber: SubscriberId) -> usize {
        self.inner
            .listener
            .read()
            .values()
            .flat_map(|l| l.iter())
            .filter(|s| s.subscriber == subscriber)
            .count()
    }

    // -----------------------------------------------------------------------
    // Zustellung
    // -----------------------------------------------------------------------

    pub fn push0(&self, topic: TopicId) -> PushReport {
        self.zustellen(topic, 0, |cb| match cb {
            Callback::Arity0(f) => Some(Ok(f())),
            _ => None,
        })
    }

    pub fn push1<A: Any>(&self, topic: TopicId, a: &A) -> PushReport {
        self.zustellen(topic, 1, |cb| match cb {
            Callback::Arity1(f) => Some(f(a)),
            _ => None,
        })
    }

    pub fn push2<A: Any, B: Any>(&self, topic: TopicId, a: &A, b: &B) -> PushReport {
        self.zustellen(topic, 2, |cb| match cb {
            Callback::Arity2(f) => Some(f(a, b)),
            _ => None,
        })
    }

    pub fn push3<A: Any, B: Any, C: Any>(&self, topic: TopicId, a: &A, b: &B, c: &C) -> PushReport {
        self.zustellen(topic, 3, |cb| match cb {
            Callback::Arity3(f) => Some(f(a, b, c)),
            _ => None,
        })
    }

    pub fn push4<A: Any, B: Any, C: Any, D: Any>(
        &self,
        topic: TopicId,
        a: &A,
        b: &B,
        c: &C,
        d: &D,
    ) -> PushReport {
        self.zustellen(topic, 4, |cb| match cb {
            Callback::Arity4(f) => Some(f(a, b, c, d)),
            _ => None,
        })
    }

    fn zustellen<F>(&self, topic: TopicId, arity: usize, aufrufen: F) -> PushReport
    where
        F: Fn(&Callback) -> Option<Aufruf>,
    {
        // Snapshot unter kurzem Lock, Aufrufe ohne Lock
        let snapshot: Vec<Subscription> = match self.inner.listener.read().get(&topic) {
            Some(liste) => liste.clone(),
            None => return PushReport::default(),
        };

        let mut report = PushReport::default();
        let sink = &self.inner.fault_sink;

        for sub in &snapshot {
            let ergebnis = panic::catch_unwind(AssertUnwindSafe(|| aufrufen(&sub.callback)));
            match ergebnis {
                Ok(Some(Ok(Ok(())))) => report.aufgerufen += 1,
                Ok(Some(Ok(Err(e)))) => {
                    report.fehlgeschlagen += 1;
                    sink.melden(&ListenerFault {
                        subscriber: sub.subscriber,
                        topic,
                        grund: format!("{:#}", e),
                        panik: false,
                    });
                }
                Ok(Some(Err(typ))) => {
                    report.uebersprungen += 1;
                    let grund = format!(
                        "Argument {} ist nicht vom Typ {}",
                        typ.position, typ.erwartet
                    );
                    sink.vertragsverletzung(sub.subscriber, topic, &grund);
                }
                Ok(None) => {
                    report.uebersprungen += 1;
                    let grund = format!(
                        "Listener erwartet {} Argumente, push liefert {}",
                        sub.callback.arity(),
                        arity
                    );
                    sink.vertragsverletzung(sub.subscriber, topic, &grund);
                }
                Err(payload) => {
                    report.fehlgeschlagen += 1;
                    sink.melden(&ListenerFault {
                        subscriber: sub.subscriber,
                        topic,
                        grund: panik_text(payload.as_ref()),
                        panik: true,
                    });
                }
            }
        }

        report
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::neu()
    }
}

fn panik_text(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unbekannte Panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
