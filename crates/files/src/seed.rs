//! Sample project the store can start with, so a file browser has
//! something to show before the agent writes anything.

use crate::store::{FileStoreError, VirtualFileStore};

const APP_JSX: &str = r#"import React, { useState } from 'react';
import './App.css';

function App() {
  const [count, setCount] = useState(0);

  return (
    <div className="App">
      <header className="App-header">
        <h1>Welcome to My React App</h1>
        <p>Count: {count}</p>
        <button onClick={() => setCount(count + 1)}>
          Increment
        </button>
        <button onClick={() => setCount(count - 1)}>
          Decrement
        </button>
      </header>
    </div>
  );
}

export default App;"#;

const APP_CSS: &str = r#".App {
  text-align: center;
}

.App-header {
  background-color: #282c34;
  padding: 20px;
  color: white;
  min-height: 100vh;
  display: flex;
  flex-direction: column;
  align-items: center;
  justify-content: center;
}

button {
  background-color: #61dafb;
  border: none;
  padding: 10px 20px;
  margin: 5px;
  border-radius: 5px;
  cursor: pointer;
  font-size: 16px;
}

button:hover {
  background-color: #21a9c7;
}"#;

const PACKAGE_JSON: &str = r#"{
  "name": "my-react-app",
  "version": "1.0.0",
  "private": true,
  "dependencies": {
    "react": "^18.2.0",
    "react-dom": "^18.2.0",
    "react-scripts": "5.0.1"
  },
  "scripts": {
    "start": "react-scripts start",
    "build": "react-scripts build",
    "test": "react-scripts test",
    "eject": "react-scripts eject"
  }
}"#;

/// The seed files, in listing order.
pub const SAMPLE_PROJECT: &[(&str, &str)] = &[
    ("src/App.jsx", APP_JSX),
    ("src/App.css", APP_CSS),
    ("package.json", PACKAGE_JSON),
];

impl VirtualFileStore {
    /// A store pre-populated with a small React project.
    pub fn with_sample_project() -> Result<Self, FileStoreError> {
        let store = Self::new();
        store.seed(SAMPLE_PROJECT)?;
        Ok(store)
    }

    /// Write seed records into the store.
    pub fn seed(&self, files: &[(&str, &str)]) -> Result<(), FileStoreError> {
        for (path, content) in files {
            self.put(path, *content)?;
        }
        Ok(())
    }
}
