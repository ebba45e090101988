//! POM parsing: dependency declarations, parent references, dependency
//! management, and `${property}` interpolation.

use std::collections::BTreeMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use airlift_util::error::AirliftError;

/// A parsed Project Object Model document.
#[derive(Debug, Clone, Default)]
pub struct Pom {
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub version: Option<String>,
    pub packaging: Option<String>,
    pub parent: Option<ParentRef>,
    pub properties: BTreeMap<String, String>,
    pub dependencies: Vec<PomDependency>,
    pub dependency_management: Vec<PomDependency>,
}

/// Reference to a parent POM up the inheritance chain.
#[derive(Debug, Clone, Default)]
pub struct ParentRef {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

/// One `<dependency>` element.
#[derive(Debug, Clone, Default)]
pub struct PomDependency {
    pub group_id: String,
    pub artifact_id: String,
    pub version: Option<String>,
    pub scope: Option<String>,
    pub optional: bool,
    pub type_: Option<String>,
}

impl Pom {
    /// Effective group ID (falls back to the parent's).
    pub fn effective_group_id(&self) -> Option<&str> {
        self.group_id
            .as_deref()
            .or(self.parent.as_ref().map(|p| p.group_id.as_str()))
    }

    /// Effective version (falls back to the parent's).
    pub fn effective_version(&self) -> Option<&str> {
        self.version
            .as_deref()
            .or(self.parent.as_ref().map(|p| p.version.as_str()))
    }

    /// Resolve `${property}` references using POM properties and the
    /// built-in `project.*` variables. Bounded to avoid reference loops.
    pub fn interpolate(&self, input: &str) -> String {
        let mut result = input.to_string();
        for _ in 0..10 {
            let Some(start) = result.find("${") else {
                break;
            };
            let Some(rel_end) = result[start..].find('}') else {
                break;
            };
            let key = &result[start + 2..start + rel_end];
            match self.property(key) {
                Some(value) => {
                    result = format!(
                        "{}{}{}",
                        &result[..start],
                        value,
                        &result[start + rel_end + 1..]
                    );
                }
                None => break,
            }
        }
        result
    }

    fn property(&self, key: &str) -> Option<String> {
        match key {
            "project.groupId" | "pom.groupId" => {
                self.effective_group_id().map(str::to_string)
            }
            "project.artifactId" | "pom.artifactId" => self.artifact_id.clone(),
            "project.version" | "pom.version" => self.effective_version().map(str::to_string),
            "project.parent.groupId" => self.parent.as_ref().map(|p| p.group_id.clone()),
            "project.parent.version" => self.parent.as_ref().map(|p| p.version.clone()),
            _ => self.properties.get(key).cloned(),
        }
    }

    /// Interpolate all property references inside dependency coordinates.
    pub fn resolve_properties(&mut self) {
        let snapshot = self.clone();
        for dep in self
            .dependencies
            .iter_mut()
            .chain(self.dependency_management.iter_mut())
        {
            dep.group_id = snapshot.interpolate(&dep.group_id);
            dep.artifact_id = snapshot.interpolate(&dep.artifact_id);
            if let Some(v) = &dep.version {
                dep.version = Some(snapshot.interpolate(v));
            }
        }
    }

    /// Fold a parent POM into this one: properties, coordinates and
    /// dependency management entries the child does not already declare.
    pub fn apply_parent(&mut self, parent: &Pom) {
        for (k, v) in &parent.properties {
            self.properties.entry(k.clone()).or_insert_with(|| v.clone());
        }
        if self.group_id.is_none() {
            self.group_id = parent.effective_group_id().map(str::to_string);
        }
        if self.version.is_none() {
            self.version = parent.effective_version().map(str::to_string);
        }
        for dm in &parent.dependency_management {
            let dominated = self
                .dependency_management
                .iter()
                .any(|d| d.group_id == dm.group_id && d.artifact_id == dm.artifact_id);
            if !dominated {
                self.dependency_management.push(dm.clone());
            }
        }
    }

    /// Version pinned by dependency management for a coordinate.
    pub fn managed_version(&self, group_id: &str, artifact_id: &str) -> Option<&str> {
        self.dependency_management
            .iter()
            .find(|d| d.group_id == group_id && d.artifact_id == artifact_id)
            .and_then(|d| d.version.as_deref())
    }

    /// BOM imports: dependency-management entries with `scope=import` and
    /// `type=pom`, whose own management tables fold into this POM.
    pub fn bom_imports(&self) -> Vec<&PomDependency> {
        self.dependency_management
            .iter()
            .filter(|d| {
                d.scope.as_deref() == Some("import")
                    && d.type_.as_deref().unwrap_or("jar") == "pom"
            })
            .collect()
    }
}

/// Parse a POM XML document.
pub fn parse_pom(xml: &str) -> miette::Result<Pom> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut pom = Pom::default();
    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut current_dep: Option<PomDependency> = None;
    let mut current_parent: Option<ParentRef> = None;
    let mut in_management = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                path.push(tag);
                text.clear();
                match context(&path).as_str() {
                    "project>dependencies>dependency" => {
                        in_management = false;
                        current_dep = Some(PomDependency::default());
                    }
                    "project>dependencyManagement>dependencies>dependency" => {
                        in_management = true;
                        current_dep = Some(PomDependency::default());
                    }
                    "project>parent" => current_parent = Some(ParentRef::default()),
                    _ => {}
                }
            }
            Ok(Event::Text(ref e)) => {
                text = e.unescape().unwrap_or_default().to_string();
            }
            Ok(Event::End(_)) => {
                let ctx = context(&path);
                let leaf = path.last().map(String::as_str).unwrap_or("");

                // <properties> children are arbitrary tag names
                if path.len() == 3 && path.get(1).map(String::as_str) == Some("properties") {
                    pom.properties.insert(leaf.to_string(), text.clone());
                }

                if let Some(dep) = current_dep.as_mut() {
                    match leaf {
                        "groupId" if ctx.ends_with(">dependency>groupId") => {
                            dep.group_id = text.clone();
                        }
                        "artifactId" if ctx.ends_with(">dependency>artifactId") => {
                            dep.artifact_id = text.clone();
                        }
                        "version" if ctx.ends_with(">dependency>version") => {
                            dep.version = Some(text.clone());
                        }
                        "scope" if ctx.ends_with(">dependency>scope") => {
                            dep.scope = Some(text.clone());
                        }
                        "optional" if ctx.ends_with(">dependency>optional") => {
                            dep.optional = text.trim() == "true";
                        }
                        "type" if ctx.ends_with(">dependency>type") => {
                            dep.type_ = Some(text.clone());
                        }
                        _ => {}
                    }
                    if ctx == "project>dependencies>dependency"
                        || ctx == "project>dependencyManagement>dependencies>dependency"
                    {
                        let dep = current_dep.take().expect("open dependency");
                        if in_management {
                            pom.dependency_management.push(dep);
                        } else {
                            pom.dependencies.push(dep);
                        }
                    }
                }

                if let Some(parent) = current_parent.as_mut() {
                    match (leaf, ctx.as_str()) {
                        ("groupId", "project>parent>groupId") => parent.group_id = text.clone(),
                        ("artifactId", "project>parent>artifactId") => {
                            parent.artifact_id = text.clone();
                        }
                        ("version", "project>parent>version") => parent.version = text.clone(),
                        _ => {}
                    }
                    if ctx == "project>parent" {
                        pom.parent = current_parent.take();
                    }
                }

                if path.len() == 2 {
                    match leaf {
                        "groupId" => pom.group_id = Some(text.clone()),
                        "artifactId" => pom.artifact_id = Some(text.clone()),
                        "version" => pom.version = Some(text.clone()),
                        "packaging" => pom.packaging = Some(text.clone()),
                        _ => {}
                    }
                }

                path.pop();
                text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(AirliftError::Parse {
                    message: format!("malformed POM XML: {e}"),
                }
                .into());
            }
            _ => {}
        }
    }

    Ok(pom)
}

fn context(path: &[String]) -> String {
    path.join(">")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPRING_STYLE_POM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<project xmlns="http://maven.apache.org/POM/4.0.0">
    <modelVersion>4.0.0</modelVersion>
    <groupId>org.springframework</groupId>
    <artifactId>spring-core</artifactId>
    <version>5.3.0</version>

    <properties>
        <jcl.version>5.3.0</jcl.version>
    </properties>

    <dependencies>
        <dependency>
            <groupId>org.springframework</groupId>
            <artifactId>spring-jcl</artifactId>
            <version>${jcl.version}</version>
        </dependency>
        <dependency>
            <groupId>junit</groupId>
            <artifactId>junit</artifactId>
            <version>4.13.2</version>
            <scope>test</scope>
        </dependency>
        <dependency>
            <groupId>com.example</groupId>
            <artifactId>maybe</artifactId>
            <version>1.0</version>
            <optional>true</optional>
        </dependency>
    </dependencies>
</project>"#;

    #[test]
    fn parses_coordinates_and_dependencies() {
        let pom = parse_pom(SPRING_STYLE_POM).unwrap();
        assert_eq!(pom.group_id.as_deref(), Some("org.springframework"));
        assert_eq!(pom.artifact_id.as_deref(), Some("spring-core"));
        assert_eq!(pom.version.as_deref(), Some("5.3.0"));
        assert_eq!(pom.dependencies.len(), 3);
        assert_eq!(pom.dependencies[1].scope.as_deref(), Some("test"));
        assert!(pom.dependencies[2].optional);
    }

    #[test]
    fn property_interpolation() {
        let mut pom = parse_pom(SPRING_STYLE_POM).unwrap();
        pom.resolve_properties();
        assert_eq!(pom.dependencies[0].version.as_deref(), Some("5.3.0"));
    }

    #[test]
    fn project_variables_interpolate() {
        let xml = r#"<project>
            <groupId>org.example</groupId>
            <artifactId>lib</artifactId>
            <version>3.0.0</version>
            <dependencies>
                <dependency>
                    <groupId>${project.groupId}</groupId>
                    <artifactId>sibling</artifactId>
                    <version>${project.version}</version>
                </dependency>
            </dependencies>
        </project>"#;
        let mut pom = parse_pom(xml).unwrap();
        pom.resolve_properties();
        assert_eq!(pom.dependencies[0].group_id, "org.example");
        assert_eq!(pom.dependencies[0].version.as_deref(), Some("3.0.0"));
    }

    #[test]
    fn parent_fallback_and_merge() {
        let child_xml = r#"<project>
            <parent>
                <groupId>org.example</groupId>
                <artifactId>parent-pom</artifactId>
                <version>2.0.0</version>
            </parent>
            <artifactId>child</artifactId>
        </project>"#;
        let mut child = parse_pom(child_xml).unwrap();
        assert_eq!(child.effective_group_id(), Some("org.example"));
        assert_eq!(child.effective_version(), Some("2.0.0"));

        let parent_xml = r#"<project>
            <groupId>org.example</groupId>
            <artifactId>parent-pom</artifactId>
            <version>2.0.0</version>
            <properties><slf4j.version>2.0.9</slf4j.version></properties>
            <dependencyManagement>
                <dependencies>
                    <dependency>
                        <groupId>org.slf4j</groupId>
                        <artifactId>slf4j-api</artifactId>
                        <version>${slf4j.version}</version>
                    </dependency>
                </dependencies>
            </dependencyManagement>
        </project>"#;
        let parent = parse_pom(parent_xml).unwrap();
        child.apply_parent(&parent);
        child.resolve_properties();
        assert_eq!(child.managed_version("org.slf4j", "slf4j-api"), Some("2.0.9"));
    }

    #[test]
    fn bom_imports_detected() {
        let xml = r#"<project>
            <groupId>g</groupId><artifactId>a</artifactId><version>1</version>
            <dependencyManagement>
                <dependencies>
                    <dependency>
                        <groupId>io.netty</groupId>
                        <artifactId>netty-bom</artifactId>
                        <version>4.1.100.Final</version>
                        <type>pom</type>
                        <scope>import</scope>
                    </dependency>
                    <dependency>
                        <groupId>com.google.guava</groupId>
                        <artifactId>guava</artifactId>
                        <version>32.0.0-jre</version>
                    </dependency>
                </dependencies>
            </dependencyManagement>
        </project>"#;
        let pom = parse_pom(xml).unwrap();
        let boms = pom.bom_imports();
        assert_eq!(boms.len(), 1);
        assert_eq!(boms[0].artifact_id, "netty-bom");
        assert_eq!(
            pom.managed_version("com.google.guava", "guava"),
            Some("32.0.0-jre")
        );
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        let err = parse_pom("<project><groupId></artifactId></project>").unwrap_err();
        assert!(err.to_string().contains("malformed POM"));
    }
}
