//! SOAP request envelopes for the upstream identity services.
//!
//! Each service differs only in data (endpoint, namespaces, body element),
//! so the per-service details live in tables here and a single rendering
//! path fills in the caller's identity query.

use crate::error::RelayError;
use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};
use std::fmt;

/// SOAP 1.1 request content type.
pub const SOAP_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

const DNI_PLACEHOLDER: &str = "{dni}";
const SEXO_PLACEHOLDER: &str = "{sexo}";

const PADRES_TEMPLATE: &str = r#"<x:Envelope
    xmlns:x="http://schemas.xmlsoap.org/soap/envelope/"
    xmlns:urn="urn:padreswsdl">
    <x:Header/>
    <x:Body>
        <urn:obtenerDatosPadres>
            <urn:DatosEntrada>
                <dni>{dni}</dni>
                <sexo>{sexo}</sexo>
            </urn:DatosEntrada>
        </urn:obtenerDatosPadres>
    </x:Body>
</x:Envelope>"#;

const HIJOS_TEMPLATE: &str = r#"<x:Envelope
    xmlns:x="http://schemas.xmlsoap.org/soap/envelope/"
    xmlns:urn="urn:hijoswsdl">
    <x:Header/>
    <x:Body>
        <urn:obtenerDatosHijos>
            <urn:DatosEntrada>
                <dni>{dni}</dni>
                <sexo>{sexo}</sexo>
            </urn:DatosEntrada>
        </urn:obtenerDatosHijos>
    </x:Body>
</x:Envelope>"#;

const FISCAL_TEMPLATE: &str = r#"<x:Envelope
    xmlns:x="http://schemas.xmlsoap.org/soap/envelope/"
    xmlns:urn1="urn:miniteriorwsdl"
    xmlns:urn="urn:mininteriorwsdl">
    <x:Header/>
    <x:Body>
        <urn1:obtenerUltimoEjemplar>
            <urn1:DatosEntrada>
                <urn:dni>{dni}</urn:dni>
                <urn:sexo>{sexo}</urn:sexo>
            </urn1:DatosEntrada>
        </urn1:obtenerUltimoEjemplar>
    </x:Body>
</x:Envelope>"#;

/// The upstream identity services, in the order they are queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    /// Parents of the queried person
    Padres,
    /// Children of the queried person
    Hijos,
    /// Latest identity document record
    Fiscal,
}

impl Service {
    /// All services in query order.
    pub const ALL: [Service; 3] = [Service::Padres, Service::Hijos, Service::Fiscal];

    /// Name used as the result key and in the SOAPAction.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Padres => "padres",
            Self::Hijos => "hijos",
            Self::Fiscal => "fiscal",
        }
    }

    /// Production endpoint for this service.
    pub fn default_url(&self) -> &'static str {
        match self {
            Self::Padres => "https://renaperdatosc.idear.gov.ar:8446/WSpadres.php",
            Self::Hijos => "https://renaperdatosc.idear.gov.ar:8446/WShijos.php",
            Self::Fiscal => "https://renaperdatosc.idear.gov.ar:8446/DATOSCMPFISCAL.php",
        }
    }

    /// SOAPAction header value: `urn:<service>wsdl#obtenerDatos<Service>`.
    ///
    /// The fiscal service does not actually expose `obtenerDatosFiscal`; the
    /// upstream ignores the action and dispatches on the body element.
    pub fn soap_action(&self) -> String {
        let name = self.as_str();
        let mut chars = name.chars();
        let capitalized = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
            None => String::new(),
        };
        format!("urn:{}wsdl#obtenerDatos{}", name, capitalized)
    }

    fn template(&self) -> &'static str {
        match self {
            Self::Padres => PADRES_TEMPLATE,
            Self::Hijos => HIJOS_TEMPLATE,
            Self::Fiscal => FISCAL_TEMPLATE,
        }
    }

    /// Render the request envelope for `query`.
    ///
    /// Query values are escaped as XML text content so they can never add
    /// markup to the envelope.
    pub fn render(&self, query: &IdentityQuery) -> String {
        let fields = [
            (DNI_PLACEHOLDER, query.dni()),
            (SEXO_PLACEHOLDER, query.sexo()),
        ];

        // Single pass over the template; substituted values are never rescanned
        let mut rendered = String::with_capacity(self.template().len() + 32);
        let mut rest = self.template();
        while let Some((at, placeholder, value)) = fields
            .iter()
            .filter_map(|&(placeholder, value)| rest.find(placeholder).map(|at| (at, placeholder, value)))
            .min_by_key(|&(at, _, _)| at)
        {
            rendered.push_str(&rest[..at]);
            rendered.push_str(&escape(value));
            rest = &rest[at + placeholder.len()..];
        }
        rendered.push_str(rest);
        rendered
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The person being looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityQuery {
    dni: String,
    sexo: String,
}

impl IdentityQuery {
    /// Build a query from optional caller input; both values must be non-empty.
    pub fn new(dni: Option<String>, sexo: Option<String>) -> Result<Self, RelayError> {
        match (dni, sexo) {
            (Some(dni), Some(sexo)) if !dni.is_empty() && !sexo.is_empty() => {
                Ok(Self { dni, sexo })
            }
            _ => Err(RelayError::Validation(
                "Missing required query parameters: dni and sexo".to_string(),
            )),
        }
    }

    /// Identification number.
    pub fn dni(&self) -> &str {
        &self.dni
    }

    /// Sex/category code.
    pub fn sexo(&self) -> &str {
        &self.sexo
    }
}
