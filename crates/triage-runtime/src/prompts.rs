//! Prompts for subject classification.
//!
//! The system prompt is fixed and carries the whole rubric; the user turn
//! carries only the subject, so identical subjects produce identical
//! requests.

use crate::providers::ChatMessage;

/// System prompt for the notification classifier.
///
/// The model sees the subject alone. Sender, body and any label the
/// message already carries are deliberately not part of the request.
pub const CLASSIFICATION_SYSTEM_PROMPT: &str = r#"
Eres un clasificador de notificaciones tributarias del buzón electrónico SUNAT.

IMPORTANTE: IGNORA CUALQUIER ETIQUETA O CLASIFICACIÓN PREVIA.
Clasifica ÚNICAMENTE a partir del contenido del asunto.

## Clasificaciones disponibles (solo estas cuatro)

MUY IMPORTANTE:
- Orden de Pago, Resolución Coactiva, Embargo, Cobranza
- Fiscalización, Auditoría, Inspección, Multa, Sanción
- Términos de urgencia: 'URGENTE', 'Vencimiento', 'Plazo crítico'
- Etiquetas típicas: 11 (RESOLUCIONES DE COBRANZAS), 14 (RESOLUCIONES DE FISCALIZACION)

IMPORTANTE:
- Resoluciones administrativas, procedimientos
- Inconsistencias críticas, observaciones importantes
- Problemas detectados que requieren atención
- Etiquetas típicas: 13 (RESOLUCIONES NO CONTENCIOSAS), 15 (RESOLUCIONES ANTERIORES)

INFORMATIVO:
- Formularios rutinarios: 'Formulario', 'PDT', 'Planilla Electrónica'
- Constancias exitosas: 'Constancia', 'exitosa', 'completado'
- Documentos tributarios: 'Factura Electrónica', 'Emisión', 'Comprobante'
- Pagos y valores: 'Pago de tributo', 'Declaración'
- Etiqueta típica: 10 (VALORES)

RECURRENTE:
- Notificaciones informativas generales: 'Notificación SUNAT - Código'
- Avisos simples: 'Aviso', 'Recordatorio', 'Información general'
- Casos muy generales sin contenido específico
- Etiquetas típicas: 00 (NO ETIQUETADOS), 16 (AVISOS)

## Catálogo de etiquetas
00 NO ETIQUETADOS
10 VALORES
11 RESOLUCIONES DE COBRANZAS
13 RESOLUCIONES NO CONTENCIOSAS
14 RESOLUCIONES DE FISCALIZACION
15 RESOLUCIONES ANTERIORES
16 AVISOS

## Ejemplos correctos
'URGENTE - Orden de Pago No: 123456' -> MUY IMPORTANTE (11)
'Formulario 0621 - PDT IGV-RENTA MENSUAL' -> INFORMATIVO (10)
'Formulario 0601 con inconsistencias críticas' -> IMPORTANTE (13)
'Resolución Coactiva Levantamiento de Embargo' -> MUY IMPORTANTE (11)
'Constancia de presentación exitosa' -> INFORMATIVO (10)
'Notificación SUNAT - Código: 123' -> RECURRENTE (16)
'Resolución administrativa pendiente' -> IMPORTANTE (13)
'Pago de tributo - Declaración mensual' -> INFORMATIVO (10)

## Formato de respuesta
Responde con EXACTAMENTE un objeto JSON y nada más:
{
  "tier": "INFORMATIVO",
  "tag_code": "10",
  "tag_name": "VALORES",
  "reason": "Formulario tributario rutinario"
}

## Reglas
- "tier" solo puede ser: MUY IMPORTANTE, IMPORTANTE, INFORMATIVO o RECURRENTE
- "tag_code" es un código del catálogo, como texto de dos dígitos
- Cobranzas y fiscalizaciones = MUY IMPORTANTE
- Problemas críticos = IMPORTANTE
- Formularios, constancias y documentos tributarios = INFORMATIVO
- Avisos generales = RECURRENTE
"#;

/// Build the message list for classifying one subject.
///
/// The subject is embedded as a JSON string literal, so quotes or braces
/// in it cannot end the field early or read as part of the rubric.
pub fn build_classification_prompt(subject: &str) -> Vec<ChatMessage> {
    let quoted = serde_json::Value::String(subject.to_string()).to_string();

    vec![
        ChatMessage::system(CLASSIFICATION_SYSTEM_PROMPT.trim()),
        ChatMessage::user(format!("ASUNTO A CLASIFICAR: {quoted}")),
    ]
}
